//! Routes for the browser page: JSON snapshots, live updates over SSE and the channel controls.

use crate::channel::Channel;
use crate::error::Error;
use crate::korad::{KoradPowerSupply, Transport};
use crate::shared::SharedData;
use crate::status::StatusRegister;
use futures::{Stream, StreamExt};
use log::error;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use warp::http::StatusCode;
use warp::sse::Event;
use warp::{Filter, Rejection, Reply};

const SSE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Korad(#[from] Error),
    #[error("Serial task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
    #[error("JSON Serialize Error: {0}")]
    JSONSerializeError(#[from] serde_json::Error),
}

impl WebError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebError::Korad(
                Error::InvalidValue(_) | Error::InvalidChannel(_) | Error::InvalidChannelName(_),
            ) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct AppState<P> {
    psu: Arc<KoradPowerSupply<P>>,
    data: Arc<Mutex<SharedData>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        AppState {
            psu: Arc::clone(&self.psu),
            data: Arc::clone(&self.data),
        }
    }
}

impl<P: Transport + Send + 'static> AppState<P> {
    pub fn new(psu: Arc<KoradPowerSupply<P>>, data: Arc<Mutex<SharedData>>) -> Self {
        AppState { psu, data }
    }

    fn snapshot(&self) -> Result<SharedData, WebError> {
        Ok(lock_data(&self.data)?.clone())
    }

    /// Serial traffic blocks, keep it off the runtime threads.
    async fn blocking<T, F>(&self, f: F) -> Result<T, WebError>
    where
        T: Send + 'static,
        F: FnOnce(&KoradPowerSupply<P>, &Mutex<SharedData>) -> Result<T, WebError> + Send + 'static,
    {
        let psu = Arc::clone(&self.psu);
        let data = Arc::clone(&self.data);
        tokio::task::spawn_blocking(move || f(&psu, &data)).await?
    }
}

#[derive(Deserialize, Debug)]
struct SetPoint {
    channel: Channel,
    value: f64,
}

#[derive(Deserialize, Debug)]
struct OutputRequest {
    channel: Channel,
}

fn lock_data(data: &Mutex<SharedData>) -> Result<MutexGuard<'_, SharedData>, WebError> {
    Ok(data.lock().map_err(|_| Error::DataLock)?)
}

fn to_reply<T: Serialize>(result: Result<T, WebError>) -> warp::reply::Response {
    match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => {
            error!("{}", e);
            warp::reply::with_status(warp::reply::json(&e.to_string()), e.status_code())
                .into_response()
        }
    }
}

async fn set_voltage<P: Transport + Send + 'static>(
    state: AppState<P>,
    request: SetPoint,
) -> Result<bool, WebError> {
    state
        .blocking(move |psu, data| {
            psu.set_voltage(request.channel, request.value)?;
            lock_data(data)?.set_voltage_set(request.channel, request.value);
            Ok(true)
        })
        .await
}

async fn set_current<P: Transport + Send + 'static>(
    state: AppState<P>,
    request: SetPoint,
) -> Result<bool, WebError> {
    state
        .blocking(move |psu, data| {
            psu.set_current(request.channel, request.value)?;
            lock_data(data)?.set_current_set(request.channel, request.value);
            Ok(true)
        })
        .await
}

async fn toggle_output<P: Transport + Send + 'static>(
    state: AppState<P>,
    request: OutputRequest,
) -> Result<bool, WebError> {
    state
        .blocking(move |psu, data| {
            let is_on = psu.toggle_output(request.channel)?;
            lock_data(data)?.set_output(request.channel, is_on);
            Ok(is_on)
        })
        .await
}

async fn read_status<P: Transport + Send + 'static>(
    state: AppState<P>,
) -> Result<StatusRegister, WebError> {
    state
        .blocking(|psu, data| {
            let status = psu.status()?;
            lock_data(data)?.set_status(status);
            Ok(status)
        })
        .await
}

async fn read_idn<P: Transport + Send + 'static>(state: AppState<P>) -> Result<String, WebError> {
    state
        .blocking(|psu, _| Ok(psu.serial_number()?))
        .await
}

/// Resolves once `true` is sent, or the sender is gone.
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow();
        if stop || shutdown.changed().await.is_err() {
            break;
        }
    }
}

// SSE endpoint, ends with the server so graceful shutdown is not held up by open pages
fn get_sse_stream<P: Transport + Send + 'static>(
    state: AppState<P>,
    shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    IntervalStream::new(tokio::time::interval(SSE_INTERVAL))
        .take_until(wait_for_shutdown(shutdown))
        .filter_map(move |_| {
            let state = state.clone();
            async move {
                let result = state
                    .snapshot()
                    .and_then(|data| Ok(serde_json::to_string(&data)?));
                match result {
                    Ok(sse_json) => Some(Ok(Event::default().data(sse_json))),
                    Err(e) => {
                        error!("Error reading monitor value: {}", e);
                        None
                    }
                }
            }
        })
}

fn with_state<P: Transport + Send + 'static>(
    state: AppState<P>,
) -> impl Filter<Extract = (AppState<P>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes<P: Transport + Send + 'static>(
    state: AppState<P>,
    shutdown: watch::Receiver<bool>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let channel_data_route = warp::path("channel_data")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: AppState<P>| to_reply(state.snapshot()));

    let sse_route = warp::path("sse")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(move |state: AppState<P>| {
            let stream = get_sse_stream(state, shutdown.clone());
            warp::sse::reply(warp::sse::keep_alive().stream(stream))
        });

    let idn_route = warp::path("idn")
        .and(warp::get())
        .and(with_state(state.clone()))
        .then(|state: AppState<P>| async move { to_reply(read_idn(state).await) });

    let status_route = warp::path("status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .then(|state: AppState<P>| async move { to_reply(read_status(state).await) });

    let voltage_route = warp::path("voltage")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(|state: AppState<P>, request: SetPoint| async move {
            to_reply(set_voltage(state, request).await)
        });

    let current_route = warp::path("current")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(|state: AppState<P>, request: SetPoint| async move {
            to_reply(set_current(state, request).await)
        });

    let output_route = warp::path("output")
        .and(warp::post())
        .and(with_state(state))
        .and(warp::body::json())
        .then(|state: AppState<P>, request: OutputRequest| async move {
            to_reply(toggle_output(state, request).await)
        });

    let static_files = warp::fs::dir("www");

    static_files
        .or(channel_data_route)
        .or(sse_route)
        .or(idn_route)
        .or(status_route)
        .or(voltage_route)
        .or(current_route)
        .or(output_route)
}

//! Background polling of the supply, one thread per channel sharing the serial port.

use crate::channel::{Channel, ChannelData};
use crate::error::{Error, Result};
use crate::korad::{KoradPowerSupply, Transport};
use crate::shared::SharedData;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// how often a sleeping poller looks at the running flag
const STOP_CHECK: Duration = Duration::from_millis(100);

/// Read the set points of every channel, which the web page shows as the starting entries.
pub fn initialize<P: Transport>(
    psu: &KoradPowerSupply<P>,
    channels: &[Channel],
) -> Result<SharedData> {
    let mut channel_data_array: Vec<ChannelData> = Vec::new();
    for &channel in channels {
        let voltage = psu.voltage_set(channel)?;
        let current = psu.current_set(channel)?;
        info!("Init: channel {} {:.3} V {:.3} A", channel, voltage, current);
        channel_data_array.push(ChannelData::with_set_points(channel, voltage, current));
    }
    Ok(SharedData::new(channel_data_array))
}

/// One poll of one channel into the shared data.
pub fn poll_channel<P: Transport>(
    psu: &KoradPowerSupply<P>,
    data: &Mutex<SharedData>,
    channel: Channel,
) -> Result<()> {
    debug!("updating channel {}", channel);
    let reading = psu.report(channel)?;
    data.lock().map_err(|_| Error::DataLock)?.update(reading);
    Ok(())
}

/// Refresh the status register.
pub fn poll_status<P: Transport>(psu: &KoradPowerSupply<P>, data: &Mutex<SharedData>) -> Result<()> {
    let status = psu.status()?;
    data.lock().map_err(|_| Error::DataLock)?.set_status(status);
    Ok(())
}

/// Start one polling thread per channel. They keep going through errors and return once `running`
/// is cleared.
pub fn spawn_pollers<P>(
    psu: Arc<KoradPowerSupply<P>>,
    data: Arc<Mutex<SharedData>>,
    channels: &[Channel],
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>>
where
    P: Transport + Send + 'static,
{
    channels
        .iter()
        .map(|&channel| {
            let psu = Arc::clone(&psu);
            let data = Arc::clone(&data);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    if let Err(e) = poll_channel(&*psu, &*data, channel) {
                        warn!("Channel {}: {}", channel, e);
                    }
                    wait(interval, &running);
                }
                debug!("poller for channel {} stopped", channel);
            })
        })
        .collect()
}

fn wait(interval: Duration, running: &AtomicBool) {
    let start = Instant::now();
    while running.load(Ordering::Relaxed) {
        let elapsed = start.elapsed();
        if elapsed >= interval {
            break;
        }
        thread::sleep(STOP_CHECK.min(interval - elapsed));
    }
}

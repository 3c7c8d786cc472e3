//! Process wiring.
//!
//! `run` performs the real-time process setup, builds the two link
//! queues and the status store, then starts:
//!
//! | Thread | CPUs | Priority | Task |
//! |--------|------|----------|------|
//! | `sampler` | `rt.sampler_cpu` | `rt.sampler_priority` | `BusSampler::run` |
//! | `decoder` | `rt.worker_cpus` | `rt.decoder_priority` | `Decoder::run` |
//! | `predictor` | `rt.worker_cpus` | `rt.predictor_priority` | `Predictor::run` (if configured) |
//! | main | `rt.worker_cpus` | `rt.decoder_priority` | `Responder::serve` |
//!
//! Each spawned thread applies its own affinity and priority first and
//! reports the result before its task starts; a failed setup is fatal.
//! Nothing here ever returns on success: the process ends on a signal.

use crate::decoder::Decoder;
use crate::drivers::{GpioPins, MonotonicClock, PanelScript, SimPins};
use crate::predictor::Predictor;
use crate::responder::{Responder, ResponderError};
use crate::rt::{self, RtError};
use crate::sampler::{BusSampler, SamplerTiming};
use keybus_common::config::{ConfigError, KeybusConfig};
use keybus_common::consts::{DECODER_PERIOD_NS, RT_STACK_BYTES};
use keybus_common::hal::driver::{BusClock, HalError, PinIo};
use keybus_common::link::{FrameConsumer, FrameProducer, OverflowPolicy, channel};
use keybus_common::status::status_store;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Stack size of every spawned real-time thread.
pub const RT_THREAD_STACK: usize = libc::PTHREAD_STACK_MIN + 2 * RT_STACK_BYTES;

/// Startup failure. Always fatal.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The OS refused to create a thread.
    #[error("failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        /// Thread name.
        name: String,
        /// OS error.
        source: std::io::Error,
    },

    /// A thread could not apply its real-time parameters.
    #[error("thread '{name}' setup failed: {source}")]
    ThreadSetup {
        /// Thread name.
        name: String,
        /// Setup error.
        source: RtError,
    },

    /// Process setup failed.
    #[error(transparent)]
    Rt(#[from] RtError),

    /// Bus driver failure.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// Responder socket failure.
    #[error(transparent)]
    Responder(#[from] ResponderError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where the sampler gets its pins from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    /// Memory-mapped GPIO.
    Hardware,
    /// The built-in demo panel on the monotonic clock.
    Simulated,
}

/// Spawn `body` on a named thread after applying `cpus` and `priority`.
///
/// # Errors
/// Thread creation or real-time setup failure.
pub fn spawn_rt<F>(
    name: &str,
    cpus: Vec<usize>,
    priority: i32,
    body: F,
) -> Result<JoinHandle<()>, RuntimeError>
where
    F: FnOnce() + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), RtError>>(1);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .stack_size(RT_THREAD_STACK)
        .spawn(move || {
            let setup = rt::thread_setup(&cpus, priority);
            let ok = setup.is_ok();
            let _ = ready_tx.send(setup);
            if ok {
                body();
            }
        })
        .map_err(|source| RuntimeError::ThreadSpawn {
            name: name.to_string(),
            source,
        })?;

    let setup = ready_rx.recv().unwrap_or_else(|_| {
        Err(RtError::Setup {
            call: "thread start",
            reason: "thread exited before reporting".to_string(),
        })
    });
    match setup {
        Ok(()) => {
            info!(thread = name, priority, "thread started");
            Ok(handle)
        }
        Err(source) => Err(RuntimeError::ThreadSetup {
            name: name.to_string(),
            source,
        }),
    }
}

/// Log a fatal task error and end the process.
fn fatal(task: &str, err: impl std::fmt::Display) -> ! {
    error!("FATAL: {task}: {err}");
    std::process::exit(1)
}

/// Start the sampler thread over `pins` and `clock`.
///
/// # Errors
/// Pin configuration, thread creation or setup failure.
pub fn spawn_sampler<P, C>(
    config: &KeybusConfig,
    pins: P,
    clock: C,
    frames_out: FrameProducer,
    commands_in: FrameConsumer,
) -> Result<JoinHandle<()>, RuntimeError>
where
    P: PinIo + 'static,
    C: BusClock + 'static,
{
    let timing = SamplerTiming::from(&config.bus);
    let mut sampler = BusSampler::new(pins, clock, timing, frames_out, commands_in)?;
    spawn_rt(
        "sampler",
        vec![config.rt.sampler_cpu],
        config.rt.sampler_priority,
        move || {
            sampler.run();
        },
    )
}

/// Set up and run every task. Returns only on a startup failure.
///
/// # Errors
/// Any fatal startup condition.
pub fn run(config: &KeybusConfig, mode: BusMode) -> Result<Infallible, RuntimeError> {
    config.validate()?;
    rt::process_setup(&config.rt)?;

    let (frames_tx, frames_rx) = channel(config.queues.bus_to_app, OverflowPolicy::OverwriteOldest);
    let (commands_tx, commands_rx) = channel(config.queues.app_to_bus, OverflowPolicy::Reject);
    let (status_writer, status_reader) = status_store();

    match mode {
        BusMode::Hardware => {
            let pins = GpioPins::open(&config.bus)?;
            spawn_sampler(config, pins, MonotonicClock::new(), frames_tx, commands_rx)?;
        }
        BusMode::Simulated => {
            let clock = MonotonicClock::new();
            let pins = SimPins::realtime(PanelScript::demo(), clock.now()?);
            info!("running against the simulated panel");
            spawn_sampler(config, pins, clock, frames_tx, commands_rx)?;
        }
    }
    rt::log_page_faults("sampler started");

    let mut decoder = Decoder::new(frames_rx, status_writer);
    spawn_rt(
        "decoder",
        config.rt.worker_cpus.clone(),
        config.rt.decoder_priority,
        move || {
            if let Err(e) = decoder.run(MonotonicClock::new(), DECODER_PERIOD_NS) {
                fatal("decoder", e);
            }
        },
    )?;

    match &config.predictor {
        Some(predictor_config) => {
            let mut predictor = Predictor::new(predictor_config.clone(), status_reader.clone());
            spawn_rt(
                "predictor",
                config.rt.worker_cpus.clone(),
                config.rt.predictor_priority,
                move || {
                    if let Err(e) = predictor.run(MonotonicClock::new()) {
                        fatal("predictor", e);
                    }
                },
            )?;
        }
        None => info!("no [predictor] configured; prediction disabled"),
    }

    rt::thread_setup(&config.rt.worker_cpus, config.rt.decoder_priority)?;
    let addr = SocketAddr::new(config.responder.bind, config.responder.port);
    let mut responder = Responder::bind(addr, commands_tx, status_reader)?
        .with_read_timeout(Duration::from_millis(config.responder.read_timeout_ms));
    rt::log_page_faults("startup complete");
    responder.serve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn stack_covers_prefault() {
        assert!(RT_THREAD_STACK > RT_STACK_BYTES);
    }

    #[test]
    fn spawned_body_runs_after_setup() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = spawn_rt("test-rt", vec![0], 10, move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        handle.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::ThreadSpawn {
            name: "sampler".to_string(),
            source: std::io::Error::other("no threads left"),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn thread 'sampler': no threads left"
        );
    }
}

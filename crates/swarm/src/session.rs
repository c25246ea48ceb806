use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::input::FrameInput;
use crate::net::{Transport, TransportError, TransportEvent};
use crate::role::{Role, Status};

/// Sleep between headless frames, `1000 / limit` whole milliseconds.
pub fn frame_budget(framerate_limit: u32) -> Duration {
    Duration::from_millis(1000 / framerate_limit.max(1) as u64)
}

/// Measures the time between consecutive frames.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
        }
    }

    /// Seconds since the previous call.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame);
        self.last_frame = now;
        dt.as_secs_f32()
    }
}

/// A role bound to its transport, or the error that kept the transport from opening.
///
/// A session whose transport failed keeps running in a display-only state: frames do
/// nothing and no reconnection is attempted.
pub struct Session<R> {
    role: R,
    transport: Option<Box<dyn Transport>>,
    transport_name: &'static str,
    error: Option<String>,
    running: Arc<AtomicBool>,
}

impl<R: Role> Session<R> {
    pub fn new(role: R, transport: Result<Box<dyn Transport>, TransportError>) -> Self {
        let (transport, transport_name, error) = match transport {
            Ok(transport) => {
                let name = transport.name();
                (Some(transport), name, None)
            }
            Err(e) => {
                log::error!("{}", e);
                (None, "", Some(e.to_string()))
            }
        };

        Self {
            role,
            transport,
            transport_name,
            error,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn role(&self) -> &R {
        &self.role
    }

    pub fn role_mut(&mut self) -> &mut R {
        &mut self.role
    }

    pub fn status(&self) -> Status {
        self.role.status()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport_name
    }

    pub fn transport(&self) -> Option<&dyn Transport> {
        self.transport.as_deref()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Drains every pending transport event into the role, then ticks it once.
    pub fn frame(&mut self, dt: f32, input: &FrameInput) {
        let Some(transport) = self.transport.as_deref_mut() else {
            return;
        };

        loop {
            let event = match transport.poll() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("{} poll failed: {}", transport.name(), e);
                    break;
                }
            };

            let result = match event {
                TransportEvent::Connected(peer) => self.role.on_connect(peer, transport),
                TransportEvent::Disconnected(peer) => {
                    self.role.on_disconnect(peer);
                    Ok(())
                }
                TransportEvent::Received { peer, payload } => {
                    self.role.on_receive(peer, &payload, transport)
                }
            };

            if let Err(e) = result {
                log::warn!("Send failed: {}", e);
            }
        }

        if let Err(e) = self.role.tick(dt, input, transport) {
            log::warn!("Send failed: {}", e);
        }
    }

    /// Frames at `framerate_limit` until [`Session::running`] is cleared, logging status
    /// changes, then shuts down.
    pub fn run_headless(&mut self, framerate_limit: u32) {
        let budget = frame_budget(framerate_limit);
        let mut clock = FrameClock::new();
        let mut last_status = None;

        if let Some(error) = &self.error {
            log::error!("ERROR {}", error);
        }

        while self.running.load(Ordering::SeqCst) {
            self.frame(clock.tick(), &FrameInput::idle());

            let status = self.status();
            if self.error.is_none() && last_status != Some(status) {
                log::info!("{}", status);
                last_status = Some(status);
            }

            std::thread::sleep(budget);
        }

        self.shutdown();
    }

    /// Disconnects every peer, flushes and closes the transport.
    pub fn shutdown(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        transport.disconnect_all();
        if let Err(e) = transport.flush() {
            log::warn!("Flush on shutdown failed: {}", e);
        }
        log::info!("{} transport closed", transport.name());
    }
}

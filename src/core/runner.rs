// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Run wrapper - rebuilds the engine after recoverable failures

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::{ControlHandle, Engine, EngineError};
use crate::config::EngineConfig;
use crate::station::StationError;

/// How the runner reacts to a failed engine run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Rebuild straight away
    Restart,
    /// Wait, then rebuild
    Retry(Duration),
    /// Give up and return the error
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub io_retry_wait: Duration,
    pub os_retry_wait: Duration,
    pub exit_on_io_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            io_retry_wait: Duration::from_secs(config.io_retry_wait),
            os_retry_wait: Duration::from_secs(config.os_retry_wait),
            exit_on_io_error: config.exit_on_io_error,
        }
    }

    pub fn classify(&self, err: &anyhow::Error) -> Failure {
        for cause in err.chain() {
            if let Some(engine_err) = cause.downcast_ref::<EngineError>() {
                if matches!(engine_err, EngineError::Restart) {
                    return Failure::Restart;
                }
                return Failure::Fatal;
            }
            if let Some(StationError::Io(_)) = cause.downcast_ref::<StationError>() {
                if self.exit_on_io_error {
                    return Failure::Fatal;
                }
                return Failure::Retry(self.io_retry_wait);
            }
            if cause.downcast_ref::<std::io::Error>().is_some() {
                return Failure::Retry(self.os_retry_wait);
            }
        }
        Failure::Fatal
    }
}

/// Owns the build-run-retry cycle
///
/// `build` is called for every attempt and may update the policy, so a
/// rebuilt engine also picks up a changed configuration.
pub struct Runner<F>
where
    F: FnMut(&mut RetryPolicy) -> Result<Engine>,
{
    build: F,
    policy: RetryPolicy,
    control: ControlHandle,
    attempts: u32,
}

impl<F> Runner<F>
where
    F: FnMut(&mut RetryPolicy) -> Result<Engine>,
{
    pub fn new(policy: RetryPolicy, control: ControlHandle, build: F) -> Self {
        Self {
            build,
            policy,
            control,
            attempts: 0,
        }
    }

    /// Number of engines built or attempted
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run until a clean exit, a shutdown request or a fatal error
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.control.shutdown_requested() {
                return Ok(());
            }

            self.attempts += 1;
            let outcome = (self.build)(&mut self.policy).and_then(|mut engine| engine.run());
            let err = match outcome {
                Ok(()) => {
                    info!("Engine stopped");
                    return Ok(());
                }
                Err(e) => e,
            };

            match self.policy.classify(&err) {
                Failure::Restart => info!("Restarting engine"),
                Failure::Retry(wait) => {
                    error!("Engine failed: {:#}", err);
                    info!("Waiting {:?} before restarting", wait);
                    if !self.sleep(wait) {
                        return Ok(());
                    }
                }
                Failure::Fatal => {
                    error!("Unrecoverable error: {:#}", err);
                    return Err(err);
                }
            }
        }
    }

    /// Sleep in short steps; false if a shutdown came in meanwhile
    fn sleep(&self, wait: Duration) -> bool {
        let step = Duration::from_millis(100);
        let start = Instant::now();
        while start.elapsed() < wait {
            if self.control.shutdown_requested() {
                warn!("Shutdown requested while waiting to restart");
                return false;
            }
            if self.control.take_restart() {
                return true;
            }
            std::thread::sleep(step.min(wait.saturating_sub(start.elapsed())));
        }
        !self.control.shutdown_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArchiveSchedule, ManualClock, Record};
    use crate::station::ReplayStation;
    use crate::units::UnitSystem;
    use anyhow::{anyhow, Context};
    use std::sync::Arc;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            io_retry_wait: Duration::ZERO,
            os_retry_wait: Duration::ZERO,
            exit_on_io_error: false,
        }
    }

    fn replay_engine(control: &ControlHandle, station: ReplayStation) -> Engine {
        let clock = ManualClock::new(1_700_000_000);
        Engine::assemble(
            Box::new(station.with_clock(clock.clone())),
            Arc::new(clock),
            Vec::new(),
            ArchiveSchedule::new(300, 15),
            control.clone(),
        )
    }

    #[test]
    fn test_classification() {
        let policy = RetryPolicy {
            io_retry_wait: Duration::from_secs(60),
            os_retry_wait: Duration::from_secs(10),
            exit_on_io_error: false,
        };
        let io = anyhow::Error::from(StationError::Io("port closed".to_string())).context("service archive");
        assert_eq!(policy.classify(&io), Failure::Retry(Duration::from_secs(60)));

        let os = anyhow::Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(policy.classify(&os), Failure::Retry(Duration::from_secs(10)));

        assert_eq!(policy.classify(&EngineError::Restart.into()), Failure::Restart);
        assert_eq!(policy.classify(&EngineError::UnknownService("x".into()).into()), Failure::Fatal);
        assert_eq!(policy.classify(&anyhow!("bug")), Failure::Fatal);

        let strict = RetryPolicy {
            exit_on_io_error: true,
            ..policy
        };
        assert_eq!(strict.classify(&io), Failure::Fatal);
    }

    #[test]
    fn test_io_failure_is_retried_with_a_new_engine() {
        let control = ControlHandle::new();
        let engine_control = control.clone();
        let mut builds = 0;
        let mut runner = Runner::new(quick_policy(), control, move |_: &mut RetryPolicy| {
            builds += 1;
            // Every engine hits the same I/O error; the third one is told to stop
            if builds == 3 {
                engine_control.request_shutdown();
            }
            let packet = Record::new(1_700_000_010, UnitSystem::Us).with("outTemp", 50.0);
            Ok(replay_engine(
                &engine_control,
                ReplayStation::new(vec![packet]).fail_after(1, "serial timeout"),
            ))
        });
        runner.run().unwrap();
        assert_eq!(runner.attempts(), 3);
    }

    #[test]
    fn test_exhausted_station_ends_the_run() {
        let control = ControlHandle::new();
        let engine_control = control.clone();
        let mut runner = Runner::new(quick_policy(), control, move |_: &mut RetryPolicy| {
            Ok(replay_engine(&engine_control, ReplayStation::new(Vec::new())))
        });
        runner.run().unwrap();
        assert_eq!(runner.attempts(), 1);
    }

    #[test]
    fn test_fatal_build_error_is_returned() {
        let mut runner = Runner::new(quick_policy(), ControlHandle::new(), |_: &mut RetryPolicy| {
            Err(EngineError::Config("archive_interval is 0".into())).context("building engine")
        });
        let err = runner.run().unwrap_err();
        assert!(err.to_string().contains("building engine"));
        assert_eq!(runner.attempts(), 1);
    }

    #[test]
    fn test_restart_request_rebuilds() {
        let control = ControlHandle::new();
        let engine_control = control.clone();
        let mut builds = 0;
        let mut runner = Runner::new(quick_policy(), control, move |_: &mut RetryPolicy| {
            builds += 1;
            if builds == 1 {
                engine_control.request_restart();
            }
            let packet = Record::new(1_700_000_010, UnitSystem::Us);
            Ok(replay_engine(&engine_control, ReplayStation::new(vec![packet])))
        });
        runner.run().unwrap();
        assert_eq!(runner.attempts(), 2);
    }
}

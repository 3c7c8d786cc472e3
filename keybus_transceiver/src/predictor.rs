//! Prediction collaborator task.
//!
//! Every `period_ns` the predictor snapshots the status store. When the
//! 64-value zone timestamp vector differs from the one last handed to
//! the collaborator, it runs the configured program with
//!
//! ```text
//! <program> <args...> <UTC timestamp> <obs time> <z1act,...,z32act,z1deact,...,z32deact>
//! ```
//!
//! Arguments are passed as a vector, never through a shell. Each output
//! line is logged and appended to the optional log file. A line reading
//! `prediction N: 2` (N in 1..=8) is positive; if any line is positive
//! the `on_positive` program runs once.
//!
//! The vector is remembered before the run, so each change is offered to
//! the collaborator once. A failed start skips the wake; a non-zero exit
//! is only logged and its output is still scanned.

use chrono::{DateTime, Utc};
use keybus_common::config::PredictorConfig;
use keybus_common::consts::ZONE_COUNT;
use keybus_common::hal::driver::{BusClock, HalError};
use keybus_common::status::{StatusReader, StatusSnapshot};
use std::convert::Infallible;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Zone timestamp vector: 32 activations then 32 deactivations.
pub type ZoneVector = [u64; 2 * ZONE_COUNT];

/// Collaborator failure. The wake is skipped.
#[derive(Debug, Error)]
pub enum PredictorError {
    /// The program could not be started.
    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        /// Program path.
        program: PathBuf,
        /// OS error.
        source: std::io::Error,
    },

    /// Log file write failed.
    #[error("prediction log: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a collaborator output line reports a positive prediction.
pub fn is_positive(line: &str) -> bool {
    line.match_indices("prediction ").any(|(at, m)| {
        let mut rest = line[at + m.len()..].chars();
        matches!(rest.next(), Some('1'..='8'))
            && rest.next() == Some(':')
            && rest.as_str().trim_start().starts_with('2')
    })
}

/// `a,b,c,...` with no trailing comma.
pub fn zone_csv(vector: &ZoneVector) -> String {
    let mut out = String::with_capacity(vector.len() * 11);
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out
}

/// Outcome of one collaborator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Output lines, in order.
    pub lines: Vec<String>,
    /// Whether any line was positive.
    pub positive: bool,
    /// Whether the program exited with status zero.
    pub success: bool,
}

/// Periodic caller of the prediction collaborator.
#[derive(Debug)]
pub struct Predictor {
    config: PredictorConfig,
    status: StatusReader,
    last: ZoneVector,
}

impl Predictor {
    /// Nothing is sent until some zone timestamp leaves zero.
    pub fn new(config: PredictorConfig, status: StatusReader) -> Self {
        Self {
            config,
            status,
            last: [0; 2 * ZONE_COUNT],
        }
    }

    /// Full argument vector for one run.
    pub fn collaborator_args(&self, now: DateTime<Utc>, snapshot: &StatusSnapshot) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push(now.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        args.push(snapshot.obs_time.to_string());
        args.push(zone_csv(&snapshot.zone_vector()));
        args
    }

    /// One wake. `Ok(None)` when the zone vector is unchanged.
    ///
    /// # Errors
    /// Collaborator start or log failures. The vector still counts as
    /// seen, so it is not offered again.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<Prediction>, PredictorError> {
        let snapshot = self.status.snapshot();
        let vector = snapshot.zone_vector();
        if vector == self.last {
            return Ok(None);
        }
        self.last = vector;

        let args = self.collaborator_args(now, &snapshot);
        let prediction = self.invoke(&args)?;

        if prediction.positive {
            self.fire_side_effect();
        }
        Ok(Some(prediction))
    }

    fn invoke(&self, args: &[String]) -> Result<Prediction, PredictorError> {
        let program = &self.config.program;
        debug!(program = %program.display(), "running prediction");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| PredictorError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<String> = stdout.lines().map(str::to_owned).collect();

        if let Some(path) = &self.config.log_file {
            let mut log = OpenOptions::new().create(true).append(true).open(path)?;
            for line in &lines {
                writeln!(log, "{line}")?;
            }
        }
        for line in &lines {
            info!("{line}");
        }

        let success = output.status.success();
        if !success {
            warn!(program = %program.display(), "collaborator exited with {}", output.status);
        }

        let positive = lines.iter().any(|line| is_positive(line));
        Ok(Prediction {
            lines,
            positive,
            success,
        })
    }

    fn fire_side_effect(&self) {
        let Some(program) = &self.config.on_positive else {
            info!("positive prediction; no action configured");
            return;
        };
        info!(program = %program.display(), "positive prediction; running action");
        let result = Command::new(program)
            .args(&self.config.on_positive_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(program = %program.display(), "action exited with {status}"),
            Err(e) => warn!(program = %program.display(), "action failed to start: {e}"),
        }
    }

    /// Wake every `period_ns` forever.
    ///
    /// # Errors
    /// Returns only if the clock cannot be read.
    pub fn run<C: BusClock>(&mut self, mut clock: C) -> Result<Infallible, HalError> {
        let period_ns = self.config.period_ns;
        let mut deadline = clock.now()?;
        debug!(period_ns, "predictor started");
        loop {
            deadline = deadline.add_ns(period_ns);
            clock.sleep_until(deadline);
            match self.tick(Utc::now()) {
                Ok(Some(p)) => debug!(lines = p.lines.len(), positive = p.positive, "prediction done"),
                Ok(None) => {}
                Err(e) => warn!("prediction skipped: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keybus_common::codec::{ZoneGroup, ZoneReport};
    use keybus_common::status::status_store;
    use keybus_common::zones::ZoneTracker;

    fn config(script: &str, extra: &[&str]) -> PredictorConfig {
        let mut args = vec!["-c".to_string(), script.to_string(), "collab".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        PredictorConfig {
            program: PathBuf::from("/bin/sh"),
            args,
            log_file: None,
            on_positive: None,
            on_positive_args: Vec::new(),
            period_ns: 1_000_000_000,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 5, 22, 12, 15, 0).unwrap()
    }

    #[test]
    fn positive_line_matching() {
        assert!(is_positive("prediction 1: 2"));
        assert!(is_positive("zone model prediction 8:2"));
        assert!(is_positive("prediction 3:    2 (p=0.9)"));
        assert!(!is_positive("prediction 3: 1"));
        assert!(!is_positive("prediction 9: 2"));
        assert!(!is_positive("prediction 0: 2"));
        assert!(!is_positive("prediction: 2"));
        assert!(!is_positive(""));
    }

    #[test]
    fn csv_has_64_values() {
        let mut v = [0u64; 64];
        v[0] = 5;
        v[63] = 9;
        let csv = zone_csv(&v);
        assert_eq!(csv.split(',').count(), 64);
        assert!(csv.starts_with("5,0,"));
        assert!(csv.ends_with(",0,9"));
    }

    #[test]
    fn unchanged_vector_is_skipped() {
        let (_writer, reader) = status_store();
        let mut p = Predictor::new(config("exit 1", &[]), reader);
        assert!(p.tick(noon()).unwrap().is_none());
    }

    #[test]
    fn runs_collaborator_with_appended_arguments() {
        let (mut writer, reader) = status_store();
        let mut zones = ZoneTracker::new();
        zones.apply(&ZoneReport { group: ZoneGroup::First, bitmap: 0x01 }, 42);
        writer.set_zones(&zones);
        writer.set_obs_time(42);

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("predict.log");
        let marker = dir.path().join("fired");
        let mut cfg = config(
            r#"echo "$1 $2"; echo "$3" | cut -d, -f1; echo "prediction 2: 2""#,
            &[],
        );
        cfg.log_file = Some(log.clone());
        cfg.on_positive = Some(PathBuf::from("/bin/sh"));
        cfg.on_positive_args = vec![
            "-c".to_string(),
            r#"touch "$0""#.to_string(),
            marker.display().to_string(),
        ];

        let mut p = Predictor::new(cfg, reader);
        let prediction = p.tick(noon()).unwrap().unwrap();
        assert_eq!(
            prediction.lines,
            vec!["2016-05-22T12:15:00Z 42", "42", "prediction 2: 2"]
        );
        assert!(prediction.positive);
        assert!(marker.exists());
        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "2016-05-22T12:15:00Z 42\n42\nprediction 2: 2\n"
        );

        // Same vector again: no second run.
        assert!(p.tick(noon()).unwrap().is_none());
    }

    #[test]
    fn failing_exit_runs_once_and_still_fires() {
        let (mut writer, reader) = status_store();
        let mut zones = ZoneTracker::new();
        zones.apply(&ZoneReport { group: ZoneGroup::Second, bitmap: 0x02 }, 7);
        writer.set_zones(&zones);

        let dir = tempfile::tempdir().unwrap();
        let runs = dir.path().join("runs");
        let marker = dir.path().join("fired");
        let runs_arg = runs.display().to_string();
        let mut cfg = config(
            r#"echo x >> "$1"; echo "prediction 1: 2"; exit 3"#,
            &[runs_arg.as_str()],
        );
        cfg.on_positive = Some(PathBuf::from("/bin/sh"));
        cfg.on_positive_args = vec![
            "-c".to_string(),
            r#"touch "$0""#.to_string(),
            marker.display().to_string(),
        ];

        let mut p = Predictor::new(cfg, reader);
        let first = p.tick(noon()).unwrap().unwrap();
        assert!(!first.success);
        assert!(first.positive);
        assert!(marker.exists());

        // Unchanged vector: the collaborator is not run again.
        assert!(p.tick(noon()).unwrap().is_none());
        assert!(p.tick(noon()).unwrap().is_none());
        assert_eq!(std::fs::read_to_string(&runs).unwrap().lines().count(), 1);
    }

    #[test]
    fn failed_start_is_not_repeated_for_the_same_vector() {
        let (mut writer, reader) = status_store();
        let mut zones = ZoneTracker::new();
        zones.apply(&ZoneReport { group: ZoneGroup::First, bitmap: 0x02 }, 4);
        writer.set_zones(&zones);

        let mut cfg = config("", &[]);
        cfg.program = PathBuf::from("/nonexistent/predict");
        let mut p = Predictor::new(cfg, reader);
        assert!(p.tick(noon()).is_err());
        assert!(p.tick(noon()).unwrap().is_none());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let (mut writer, reader) = status_store();
        let mut zones = ZoneTracker::new();
        zones.apply(&ZoneReport { group: ZoneGroup::First, bitmap: 0x80 }, 3);
        writer.set_zones(&zones);

        let mut cfg = config("", &[]);
        cfg.program = PathBuf::from("/nonexistent/predict");
        let mut p = Predictor::new(cfg, reader);
        let err = p.tick(noon()).unwrap_err();
        assert!(matches!(err, PredictorError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/predict"));
    }
}

//! obd-selfcheck - adapter qualification routine
//!
//! Runs several independent rounds of status/live-data/DTC reads against
//! a connected driver and folds them into a single report: did every
//! round succeed, did the vehicle answer consistently, and what value
//! ranges were observed. Used at daemon startup and from operational
//! tooling to qualify an adapter before it is put into service.

use std::time::Duration;

use chrono::{DateTime, Utc};
use obd_core::{DtcEntry, ObdLiveData, ObdStatus};
use obd_driver::Elm327Driver;
use serde::Serialize;

/// Self-check tuning
#[derive(Debug, Clone)]
pub struct SelfCheckOptions {
    /// Number of independent rounds
    pub attempts: u32,
    /// Pause between rounds
    pub delay: Duration,
}

impl Default for SelfCheckOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfCheckOutcome {
    /// Every round succeeded and all rounds agree
    Passed,
    /// Some rounds succeeded, but with failures or disagreement
    Warning,
    /// No round succeeded
    Failed,
}

impl std::fmt::Display for SelfCheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Warning => write!(f, "warning"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One round of reads; failed calls leave their field empty and record
/// an error string
#[derive(Debug, Clone, Serialize)]
pub struct SelfCheckRound {
    pub round: u32,
    pub status: Option<ObdStatus>,
    pub live_data: Option<ObdLiveData>,
    pub dtc: Option<Vec<DtcEntry>>,
    pub errors: Vec<String>,
}

impl SelfCheckRound {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Min/max over the successful live-data samples
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SelfCheckMetrics {
    pub rpm_min: Option<f64>,
    pub rpm_max: Option<f64>,
    pub coolant_temp_min: Option<f64>,
    pub coolant_temp_max: Option<f64>,
    pub vehicle_speed_min: Option<f64>,
    pub vehicle_speed_max: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfCheckReport {
    pub outcome: SelfCheckOutcome,
    pub attempts: u32,
    pub passes: u32,
    pub fails: u32,
    /// All successful rounds observed byte-identical vehicle data
    pub consistent: bool,
    /// Protocol identifier the driver negotiated
    pub protocol: Option<String>,
    pub metrics: SelfCheckMetrics,
    pub rounds: Vec<SelfCheckRound>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Comparable view of a round, stripped of timestamps
#[derive(Serialize)]
struct Fingerprint<'a> {
    status: &'a Option<ObdStatus>,
    rpm: Option<f64>,
    coolant_temp: Option<f64>,
    intake_temp: Option<f64>,
    vehicle_speed: Option<f64>,
    battery_voltage: Option<f64>,
    throttle_position: Option<f64>,
    dtc: Vec<&'a str>,
}

fn fingerprint(round: &SelfCheckRound) -> String {
    let live = round.live_data.as_ref();
    let view = Fingerprint {
        status: &round.status,
        rpm: live.and_then(|l| l.rpm),
        coolant_temp: live.and_then(|l| l.coolant_temp),
        intake_temp: live.and_then(|l| l.intake_temp),
        vehicle_speed: live.and_then(|l| l.vehicle_speed),
        battery_voltage: live.and_then(|l| l.battery_voltage),
        throttle_position: live.and_then(|l| l.throttle_position),
        dtc: round
            .dtc
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|entry| entry.code.as_str())
            .collect(),
    };
    serde_json::to_string(&view).unwrap_or_default()
}

/// Run the self-check against an already connected driver
pub async fn run_self_check(driver: &Elm327Driver, options: &SelfCheckOptions) -> SelfCheckReport {
    let started_at = Utc::now();
    let attempts = options.attempts.max(1);
    let mut rounds = Vec::with_capacity(attempts as usize);

    for round in 1..=attempts {
        if round > 1 && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
        tracing::debug!(round, attempts, "self-check round");
        let mut errors = Vec::new();

        let status = match driver.read_status().await {
            Ok(status) => Some(status),
            Err(err) => {
                errors.push(format!("read_status: {err}"));
                None
            }
        };
        let live_data = match driver.read_live_data().await {
            Ok(live) => Some(live),
            Err(err) => {
                errors.push(format!("read_live_data: {err}"));
                None
            }
        };
        let dtc = match driver.read_dtc().await {
            Ok(dtc) => Some(dtc),
            Err(err) => {
                errors.push(format!("read_dtc: {err}"));
                None
            }
        };

        rounds.push(SelfCheckRound {
            round,
            status,
            live_data,
            dtc,
            errors,
        });
    }

    let passes = rounds.iter().filter(|r| r.succeeded()).count() as u32;
    let fails = attempts - passes;

    let mut reference: Option<String> = None;
    let mut consistent = true;
    for round in rounds.iter().filter(|r| r.succeeded()) {
        let print = fingerprint(round);
        match &reference {
            None => reference = Some(print),
            Some(first) if *first != print => {
                consistent = false;
                break;
            }
            Some(_) => {}
        }
    }

    let mut metrics = SelfCheckMetrics::default();
    for live in rounds
        .iter()
        .filter(|r| r.succeeded())
        .filter_map(|r| r.live_data.as_ref())
    {
        fold_min_max(&mut metrics.rpm_min, &mut metrics.rpm_max, live.rpm);
        fold_min_max(
            &mut metrics.coolant_temp_min,
            &mut metrics.coolant_temp_max,
            live.coolant_temp,
        );
        fold_min_max(
            &mut metrics.vehicle_speed_min,
            &mut metrics.vehicle_speed_max,
            live.vehicle_speed,
        );
    }

    let outcome = if passes == 0 {
        SelfCheckOutcome::Failed
    } else if fails == 0 && consistent {
        SelfCheckOutcome::Passed
    } else {
        SelfCheckOutcome::Warning
    };
    tracing::info!(%outcome, passes, fails, consistent, "self-check finished");

    SelfCheckReport {
        outcome,
        attempts,
        passes,
        fails,
        consistent,
        protocol: driver.snapshot().protocol,
        metrics,
        rounds,
        started_at,
        finished_at: Utc::now(),
    }
}

fn fold_min_max(min: &mut Option<f64>, max: &mut Option<f64>, sample: Option<f64>) {
    let Some(value) = sample else {
        return;
    };
    *min = Some(min.map_or(value, |m| m.min(value)));
    *max = Some(max.map_or(value, |m| m.max(value)));
}

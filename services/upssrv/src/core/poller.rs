//! Device poller
//!
//! One measurement cycle against one target:
//!
//! 1. open a session (failure: `up 0`)
//! 2. pick the register map, probing the device for `auto` targets
//! 3. read the core batch (failure: `up 0`, nothing else)
//! 4. read each input phase row, then each output phase row; a failed row
//!    ends that direction only
//! 5. derive output power
//! 6. report `up 1`
//!
//! Nothing here returns an error. Every failure is folded into the
//! [`PollOutcome`].

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::core::catalogue::MetricKind;
use crate::core::family::{
    output_power, CoreKey, CoreReadings, Direction, FamilySelection, PhaseKey, PowerScope,
    RegisterMap,
};
use crate::core::measurement::{Measurement, PollOutcome};
use crate::core::target::Target;
use crate::core::transport::{Session, SessionClient};
use crate::error::Result;

/// Default bound for every request issued on a session
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(2);

/// Phase label used for unit-level readings
const UNIT_PHASE: &str = "1";

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub session_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Measurements of one target, labelled as they are pushed
struct Samples<'a> {
    target: &'a str,
    items: Vec<Measurement>,
}

impl<'a> Samples<'a> {
    fn new(target: &'a str) -> Self {
        Self {
            target,
            items: Vec::new(),
        }
    }

    fn unit(&mut self, kind: MetricKind, value: i64) {
        self.items.push(Measurement::new(
            kind,
            value as f64,
            vec![self.target.to_string()],
        ));
    }

    fn flag(&mut self, kind: MetricKind, set: bool) {
        self.unit(kind, i64::from(set));
    }

    /// Target plus one more label (phase or cause)
    fn labelled(&mut self, kind: MetricKind, label: &str, value: i64) {
        self.items.push(Measurement::new(
            kind,
            value as f64,
            vec![self.target.to_string(), label.to_string()],
        ));
    }
}

fn phase_metric(direction: Direction, key: PhaseKey) -> Option<MetricKind> {
    match (direction, key) {
        (Direction::Input, PhaseKey::Voltage) => Some(MetricKind::InputVoltage),
        (Direction::Input, PhaseKey::Frequency) => Some(MetricKind::InputFrequency),
        (Direction::Output, PhaseKey::Voltage) => Some(MetricKind::OutputVoltage),
        (Direction::Output, PhaseKey::Frequency) => Some(MetricKind::OutputFrequency),
        (Direction::Output, PhaseKey::Load) => Some(MetricKind::OutputLoad),
        (Direction::Input, PhaseKey::Load) => None,
    }
}

/// Polls single targets through a shared session client
#[derive(Debug, Clone)]
pub struct DevicePoller {
    client: Arc<dyn SessionClient>,
    settings: PollSettings,
}

impl DevicePoller {
    pub fn new(client: Arc<dyn SessionClient>, settings: PollSettings) -> Self {
        Self { client, settings }
    }

    /// Run one cycle against `target`
    pub async fn poll(&self, target: &Target) -> PollOutcome {
        let mut session = match self
            .client
            .open(
                &target.address,
                &target.community,
                self.settings.session_timeout,
            )
            .await
        {
            Ok(session) => session,
            Err(e) => {
                debug!(address = %target.address, "Session open failed: {}", e);
                return PollOutcome::unreachable(&target.address, e.to_string());
            },
        };

        let outcome = self.run_cycle(target, session.as_mut()).await;
        session.close().await;
        outcome
    }

    async fn run_cycle(&self, target: &Target, session: &mut dyn Session) -> PollOutcome {
        let map = match &target.family {
            FamilySelection::Fixed(map) => Arc::clone(map),
            FamilySelection::Auto(candidates) => match detect_family(session, candidates).await {
                Ok(Some(map)) => {
                    debug!(address = %target.address, family = map.id, "Family detected");
                    map
                },
                Ok(None) => {
                    debug!(address = %target.address, "No known family answered the identity register");
                    return PollOutcome::unreachable(&target.address, "unrecognised device family");
                },
                Err(e) => {
                    debug!(address = %target.address, "Family detection failed: {}", e);
                    return PollOutcome::unreachable(&target.address, e.to_string());
                },
            },
        };

        let values = match session.read_registers(&map.core_oids()).await {
            Ok(values) => values,
            Err(e) => {
                debug!(address = %target.address, family = map.id, "Core read failed: {}", e);
                return PollOutcome::unreachable(&target.address, e.to_string());
            },
        };
        let readings = CoreReadings::decode(&map, &values);

        let mut samples = Samples::new(&target.address);
        emit_core(&map, &readings, &mut samples);

        let mut complete = true;
        for direction in [Direction::Input, Direction::Output] {
            complete &= read_phases(session, &map, &readings, direction, &mut samples).await;
        }

        if map.power_scope == PowerScope::Unit {
            if let (Some(raw), Some(load)) = (
                readings.get(CoreKey::RawOutputPower),
                readings.get(CoreKey::OutputLoad),
            ) {
                samples.labelled(MetricKind::OutputPower, UNIT_PHASE, output_power(raw, load));
            }
        }

        samples.flag(MetricKind::Up, true);
        if complete {
            PollOutcome::Complete(samples.items)
        } else {
            PollOutcome::Partial(samples.items)
        }
    }
}

/// First candidate whose identity register holds a value
async fn detect_family(
    session: &mut dyn Session,
    candidates: &[Arc<RegisterMap>],
) -> Result<Option<Arc<RegisterMap>>> {
    for map in candidates {
        let reply = session.read_registers(std::slice::from_ref(&map.identity)).await?;
        if reply.first().copied().flatten().is_some() {
            return Ok(Some(Arc::clone(map)));
        }
    }
    Ok(None)
}

fn emit_core(map: &RegisterMap, readings: &CoreReadings, samples: &mut Samples<'_>) {
    if let Some(v) = readings.get(CoreKey::BatteryRemaining) {
        samples.unit(MetricKind::BatteryRemaining, v);
    }
    if let Some(v) = readings.get(CoreKey::BatteryCharge) {
        samples.unit(MetricKind::BatteryCharge, v);
    }
    if let Some(set) = readings.on_battery(map.flags) {
        samples.flag(MetricKind::OnBattery, set);
    }
    if let Some(set) = readings.on_bypass(map.flags) {
        samples.flag(MetricKind::OnBypass, set);
    }
    if let Some(v) = readings.get(CoreKey::AmbientTemp) {
        samples.unit(MetricKind::AmbientTemp, v);
    }
    if let Some((bad, cause)) = readings.bad_input() {
        samples.labelled(MetricKind::BadInput, cause, i64::from(bad));
    }

    // unit-level readings of families without per-phase columns
    for (key, kind) in [
        (CoreKey::InputFrequency, MetricKind::InputFrequency),
        (CoreKey::OutputFrequency, MetricKind::OutputFrequency),
        (CoreKey::OutputLoad, MetricKind::OutputLoad),
    ] {
        if let Some(v) = readings.get(key) {
            samples.labelled(kind, UNIT_PHASE, v);
        }
    }
}

/// Read phase rows `1..=count`; false when a row read failed
async fn read_phases(
    session: &mut dyn Session,
    map: &RegisterMap,
    readings: &CoreReadings,
    direction: Direction,
    samples: &mut Samples<'_>,
) -> bool {
    let registers = map.phase_registers(direction);
    if registers.is_empty() {
        return true;
    }

    let raw_power = readings.get(CoreKey::RawOutputPower);
    let per_phase_power = direction == Direction::Output && map.power_scope == PowerScope::PerPhase;

    for phase in 1..=readings.phase_count(direction) {
        let values = match session.read_registers(&map.phase_oids(direction, phase)).await {
            Ok(values) => values,
            Err(e) => {
                debug!(
                    address = %samples.target,
                    direction = %direction,
                    phase,
                    "Phase read failed, skipping remaining phases: {}",
                    e
                );
                return false;
            },
        };

        let label = phase.to_string();
        for (register, value) in registers.iter().zip(values) {
            let Some(value) = value else { continue };
            if let Some(kind) = phase_metric(direction, register.key) {
                samples.labelled(kind, &label, value);
            }
            if per_phase_power && register.key == PhaseKey::Load {
                if let Some(raw) = raw_power {
                    samples.labelled(MetricKind::OutputPower, &label, output_power(raw, value));
                }
            }
        }
    }
    true
}

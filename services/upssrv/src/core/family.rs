//! Device family register maps
//!
//! Two UPS generations expose the same physical quantities under different
//! register addresses and with different status encodings. Each family is one
//! [`RegisterMap`] entry in the [`FamilyRegistry`]; the poller is written once
//! against the semantic keys and never branches on the family itself.
//!
//! | family | MIB | flags | output power |
//! |--------|-----|-------|--------------|
//! | `xups` | Eaton XUPS-MIB (`.534.1`) | one output-source register | once per unit |
//! | `mge`  | MG-SNMP-UPS-MIB (`.705.1`) | yes/no registers | per output phase |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::oid::Oid;
use crate::core::transport::RawValue;
use crate::error::{Result, UpsSrvError};

/// Upper bound for advertised phase counts
pub const MAX_PHASES: u32 = 16;

/// Family identifier that detects the family from the device instead of naming one
pub const AUTO_FAMILY: &str = "auto";

/// Default family for targets that do not name one
pub const DEFAULT_FAMILY: &str = "xups";

/// Yes/no registers encode "yes" as 1 and "no" as 2
const YES: i64 = 1;

/// Semantic keys of the core batch read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreKey {
    BatteryRemaining,
    BatteryCharge,
    InputPhases,
    OutputPhases,
    OnBattery,
    OnBypass,
    /// Enumerated power source register (replaces the two flag registers)
    OutputSource,
    AmbientTemp,
    BadInputStatus,
    BadInputCause,
    RawOutputPower,
    InputFrequency,
    OutputFrequency,
    OutputLoad,
}

/// Semantic keys of per-phase table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKey {
    Voltage,
    Frequency,
    Load,
}

/// Input or output side of the UPS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn phase_count_key(&self) -> CoreKey {
        match self {
            Direction::Input => CoreKey::InputPhases,
            Direction::Output => CoreKey::OutputPhases,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// How the on-battery / on-bypass flags are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagEncoding {
    /// Separate `OnBattery` and `OnBypass` registers, 1 = yes, 2 = no
    YesNo,
    /// One `OutputSource` register; the listed codes mean battery / bypass
    OutputSource { battery: i64, bypass: i64 },
}

/// Where output power is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerScope {
    /// From each output phase's load
    PerPhase,
    /// Once, from the unit-level `OutputLoad` register
    Unit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreRegister {
    pub key: CoreKey,
    pub oid: Oid,
}

/// A table column; the phase index is appended as the row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRegister {
    pub key: PhaseKey,
    pub column: Oid,
}

/// Register layout of one device family
#[derive(Debug, Clone)]
pub struct RegisterMap {
    pub id: &'static str,
    pub core: Vec<CoreRegister>,
    pub input_phase: Vec<PhaseRegister>,
    pub output_phase: Vec<PhaseRegister>,
    pub flags: FlagEncoding,
    pub power_scope: PowerScope,
    /// Register whose presence identifies the family during auto-detection
    pub identity: Oid,
}

fn core(key: CoreKey, arcs: &[u32]) -> CoreRegister {
    CoreRegister {
        key,
        oid: Oid::from_slice(arcs),
    }
}

fn column(key: PhaseKey, arcs: &[u32]) -> PhaseRegister {
    PhaseRegister {
        key,
        column: Oid::from_slice(arcs),
    }
}

impl RegisterMap {
    /// Eaton XUPS-MIB (enterprise 534)
    pub fn xups() -> Self {
        const X: [u32; 8] = [1, 3, 6, 1, 4, 1, 534, 1];
        let reg = |tail: &[u32]| [&X[..], tail].concat();

        RegisterMap {
            id: "xups",
            core: vec![
                core(CoreKey::BatteryRemaining, &reg(&[2, 1, 0])),
                core(CoreKey::BatteryCharge, &reg(&[2, 4, 0])),
                core(CoreKey::InputPhases, &reg(&[3, 3, 0])),
                core(CoreKey::OutputPhases, &reg(&[4, 3, 0])),
                core(CoreKey::OutputSource, &reg(&[4, 5, 0])),
                core(CoreKey::AmbientTemp, &reg(&[6, 1, 0])),
                core(CoreKey::RawOutputPower, &reg(&[10, 3, 0])),
                core(CoreKey::InputFrequency, &reg(&[3, 1, 0])),
                core(CoreKey::OutputFrequency, &reg(&[4, 2, 0])),
                core(CoreKey::OutputLoad, &reg(&[4, 1, 0])),
            ],
            input_phase: vec![column(PhaseKey::Voltage, &reg(&[3, 4, 1, 2]))],
            output_phase: vec![column(PhaseKey::Voltage, &reg(&[4, 4, 1, 2]))],
            flags: FlagEncoding::OutputSource {
                battery: 5,
                bypass: 4,
            },
            power_scope: PowerScope::Unit,
            identity: Oid::from_slice(&reg(&[2, 4, 0])),
        }
    }

    /// MGE / Eaton MG-SNMP-UPS-MIB (enterprise 705)
    pub fn mge() -> Self {
        const M: [u32; 8] = [1, 3, 6, 1, 4, 1, 705, 1];
        let reg = |tail: &[u32]| [&M[..], tail].concat();

        RegisterMap {
            id: "mge",
            core: vec![
                core(CoreKey::BatteryRemaining, &reg(&[5, 1, 0])),
                core(CoreKey::BatteryCharge, &reg(&[5, 2, 0])),
                core(CoreKey::InputPhases, &reg(&[6, 1, 0])),
                core(CoreKey::OutputPhases, &reg(&[7, 1, 0])),
                core(CoreKey::OnBattery, &reg(&[7, 3, 0])),
                core(CoreKey::OnBypass, &reg(&[7, 4, 0])),
                core(CoreKey::AmbientTemp, &reg(&[8, 1, 0])),
                core(CoreKey::BadInputStatus, &reg(&[6, 3, 0])),
                core(CoreKey::BadInputCause, &reg(&[6, 4, 0])),
                core(CoreKey::RawOutputPower, &reg(&[4, 12, 0])),
            ],
            input_phase: vec![
                column(PhaseKey::Voltage, &reg(&[6, 2, 1, 2])),
                column(PhaseKey::Frequency, &reg(&[6, 2, 1, 3])),
            ],
            output_phase: vec![
                column(PhaseKey::Voltage, &reg(&[7, 2, 1, 2])),
                column(PhaseKey::Frequency, &reg(&[7, 2, 1, 3])),
                column(PhaseKey::Load, &reg(&[7, 2, 1, 4])),
            ],
            flags: FlagEncoding::YesNo,
            power_scope: PowerScope::PerPhase,
            identity: Oid::from_slice(&reg(&[5, 2, 0])),
        }
    }

    /// Addresses of the core batch, in request order
    pub fn core_oids(&self) -> Vec<Oid> {
        self.core.iter().map(|r| r.oid.clone()).collect()
    }

    pub fn phase_registers(&self, direction: Direction) -> &[PhaseRegister] {
        match direction {
            Direction::Input => &self.input_phase,
            Direction::Output => &self.output_phase,
        }
    }

    /// Addresses of one phase row, in `phase_registers` order
    pub fn phase_oids(&self, direction: Direction, phase: u32) -> Vec<Oid> {
        self.phase_registers(direction)
            .iter()
            .map(|r| r.column.child(phase))
            .collect()
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Text for the bad-input cause code; unknown codes decode to ""
pub fn decode_bad_input_cause(code: i64) -> &'static str {
    match code {
        1 => "no",
        2 => "voltage out of tolerance",
        3 => "frequency out of tolerance",
        4 => "no voltage at all",
        _ => "",
    }
}

/// Present values of a core batch, keyed semantically
#[derive(Debug, Clone, Default)]
pub struct CoreReadings {
    values: HashMap<CoreKey, i64>,
}

impl CoreReadings {
    /// Pair the reply with the request order; absent values are dropped
    pub fn decode(map: &RegisterMap, values: &[RawValue]) -> Self {
        let values = map
            .core
            .iter()
            .zip(values)
            .filter_map(|(register, value)| value.map(|v| (register.key, v)))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: CoreKey) -> Option<i64> {
        self.values.get(&key).copied()
    }

    /// Advertised phase count, 0 when absent, clamped to `0..=MAX_PHASES`
    pub fn phase_count(&self, direction: Direction) -> u32 {
        self.get(direction.phase_count_key())
            .unwrap_or(0)
            .clamp(0, MAX_PHASES as i64) as u32
    }

    pub fn on_battery(&self, flags: FlagEncoding) -> Option<bool> {
        match flags {
            FlagEncoding::YesNo => self.get(CoreKey::OnBattery).map(|v| v == YES),
            FlagEncoding::OutputSource { battery, .. } => {
                self.get(CoreKey::OutputSource).map(|v| v == battery)
            },
        }
    }

    pub fn on_bypass(&self, flags: FlagEncoding) -> Option<bool> {
        match flags {
            FlagEncoding::YesNo => self.get(CoreKey::OnBypass).map(|v| v == YES),
            FlagEncoding::OutputSource { bypass, .. } => {
                self.get(CoreKey::OutputSource).map(|v| v == bypass)
            },
        }
    }

    /// `(input is bad, cause text)` when the status register is present
    pub fn bad_input(&self) -> Option<(bool, &'static str)> {
        let status = self.get(CoreKey::BadInputStatus)?;
        let cause = self
            .get(CoreKey::BadInputCause)
            .map(decode_bad_input_cause)
            .unwrap_or("");
        Some((status == YES, cause))
    }
}

/// Output power derived from the rated power register and a load percentage
///
/// The raw register holds hundredths; it is truncated before multiplying,
/// matching the values existing dashboards were built on.
pub fn output_power(raw_power: i64, load: i64) -> i64 {
    (raw_power / 100) * load
}

// ============================================================================
// Registry
// ============================================================================

/// Family chosen for a target
#[derive(Debug, Clone)]
pub enum FamilySelection {
    Fixed(Arc<RegisterMap>),
    /// Read each candidate's `identity` register, in order
    Auto(Arc<[Arc<RegisterMap>]>),
}

impl FamilySelection {
    pub fn label(&self) -> &'static str {
        match self {
            FamilySelection::Fixed(map) => map.id,
            FamilySelection::Auto(_) => AUTO_FAMILY,
        }
    }
}

/// Closed table of known families keyed by identifier
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    families: Vec<Arc<RegisterMap>>,
}

impl FamilyRegistry {
    pub fn empty() -> Self {
        Self {
            families: Vec::new(),
        }
    }

    /// The families supported out of the box
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(RegisterMap::xups());
        registry.register(RegisterMap::mge());
        registry
    }

    /// Add a family, replacing one with the same id
    pub fn register(&mut self, map: RegisterMap) {
        let map = Arc::new(map);
        match self.families.iter_mut().find(|f| f.id == map.id) {
            Some(existing) => *existing = map,
            None => self.families.push(map),
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<RegisterMap>> {
        let wanted = id.trim().to_ascii_lowercase();
        self.families
            .iter()
            .find(|f| f.id == wanted)
            .cloned()
            .ok_or_else(|| UpsSrvError::UnknownFamily(id.to_string()))
    }

    /// Resolve a family identifier, accepting `auto`
    pub fn select(&self, id: &str) -> Result<FamilySelection> {
        if id.trim().eq_ignore_ascii_case(AUTO_FAMILY) {
            return Ok(FamilySelection::Auto(self.families.clone().into()));
        }
        self.get(id).map(FamilySelection::Fixed)
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.families.iter().map(|f| f.id).collect()
    }
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_bad_input_cause_table() {
        assert_eq!(decode_bad_input_cause(1), "no");
        assert_eq!(decode_bad_input_cause(2), "voltage out of tolerance");
        assert_eq!(decode_bad_input_cause(3), "frequency out of tolerance");
        assert_eq!(decode_bad_input_cause(4), "no voltage at all");
        assert_eq!(decode_bad_input_cause(0), "");
        assert_eq!(decode_bad_input_cause(5), "");
        assert_eq!(decode_bad_input_cause(-1), "");
    }

    #[test]
    fn test_output_power_truncates_before_multiplying() {
        assert_eq!(output_power(100_000, 50), 50_000);
        assert_eq!(output_power(1_000, 50), 500);
        assert_eq!(output_power(99, 100), 0);
        assert_eq!(output_power(150, 3), 3);
        assert_eq!(output_power(123_456, 0), 0);
        // (raw * load) / 100 would give 4
        assert_eq!(output_power(199, 2), 2);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = FamilyRegistry::builtin();
        assert_eq!(registry.ids(), vec!["xups", "mge"]);
        assert_eq!(registry.get("xups").unwrap().id, "xups");
        assert_eq!(registry.get(" MGE ").unwrap().id, "mge");
        assert_eq!(
            registry.get("apc").unwrap_err(),
            UpsSrvError::UnknownFamily("apc".into())
        );
    }

    #[test]
    fn test_select_auto_lists_all_families() {
        let registry = FamilyRegistry::builtin();
        match registry.select("auto").unwrap() {
            FamilySelection::Auto(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected auto selection, got {:?}", other),
        }
        assert_eq!(registry.select("mge").unwrap().label(), "mge");
        assert!(registry.select("unknown").is_err());
    }

    #[test]
    fn test_third_family_is_a_table_entry() {
        let mut registry = FamilyRegistry::builtin();
        let mut custom = RegisterMap::mge();
        custom.id = "custom";
        registry.register(custom);
        assert_eq!(registry.ids(), vec!["xups", "mge", "custom"]);

        // re-registering replaces in place
        registry.register(RegisterMap::xups());
        assert_eq!(registry.ids().len(), 3);
    }

    #[test]
    fn test_core_layouts() {
        let xups = RegisterMap::xups();
        assert_eq!(
            xups.core_oids()[1].to_string(),
            "1.3.6.1.4.1.534.1.2.4.0"
        );
        assert_eq!(
            xups.phase_oids(Direction::Output, 2)[0].to_string(),
            "1.3.6.1.4.1.534.1.4.4.1.2.2"
        );

        let mge = RegisterMap::mge();
        let row = mge.phase_oids(Direction::Output, 3);
        assert_eq!(row.len(), 3);
        assert_eq!(row[2].to_string(), "1.3.6.1.4.1.705.1.7.2.1.4.3");
        assert!(mge.core.iter().any(|r| r.key == CoreKey::BadInputCause));
        assert!(!xups.core.iter().any(|r| r.key == CoreKey::BadInputStatus));
    }

    #[test]
    fn test_decode_skips_absent_values() {
        let mge = RegisterMap::mge();
        let mut values: Vec<RawValue> = vec![None; mge.core.len()];
        values[1] = Some(87); // battery charge
        values[3] = Some(3); // output phases
        let readings = CoreReadings::decode(&mge, &values);

        assert_eq!(readings.get(CoreKey::BatteryCharge), Some(87));
        assert_eq!(readings.get(CoreKey::BatteryRemaining), None);
        assert_eq!(readings.phase_count(Direction::Output), 3);
        assert_eq!(readings.phase_count(Direction::Input), 0);
        assert_eq!(readings.bad_input(), None);
    }

    #[test]
    fn test_phase_count_is_clamped() {
        let xups = RegisterMap::xups();
        let mut values: Vec<RawValue> = vec![None; xups.core.len()];
        values[2] = Some(-4);
        values[3] = Some(1_000);
        let readings = CoreReadings::decode(&xups, &values);
        assert_eq!(readings.phase_count(Direction::Input), 0);
        assert_eq!(readings.phase_count(Direction::Output), MAX_PHASES);
    }

    #[test]
    fn test_flag_encodings() {
        let xups = RegisterMap::xups();
        let mut values: Vec<RawValue> = vec![None; xups.core.len()];
        values[4] = Some(5); // output source: battery
        let readings = CoreReadings::decode(&xups, &values);
        assert_eq!(readings.on_battery(xups.flags), Some(true));
        assert_eq!(readings.on_bypass(xups.flags), Some(false));

        let mge = RegisterMap::mge();
        let mut values: Vec<RawValue> = vec![None; mge.core.len()];
        values[4] = Some(2); // on battery: no
        values[5] = Some(1); // on bypass: yes
        values[7] = Some(1); // bad input: yes
        values[8] = Some(3); // cause: frequency
        let readings = CoreReadings::decode(&mge, &values);
        assert_eq!(readings.on_battery(mge.flags), Some(false));
        assert_eq!(readings.on_bypass(mge.flags), Some(true));
        assert_eq!(
            readings.bad_input(),
            Some((true, "frequency out of tolerance"))
        );
    }

    #[test]
    fn test_bad_input_without_cause_has_empty_label() {
        let mge = RegisterMap::mge();
        let mut values: Vec<RawValue> = vec![None; mge.core.len()];
        values[7] = Some(2);
        let readings = CoreReadings::decode(&mge, &values);
        assert_eq!(readings.bad_input(), Some((false, "")));
    }
}

//! Measurement catalogue
//!
//! The fixed set of metrics this exporter can ever emit. The table is built
//! once at startup from the configured name prefix and shared read-only by
//! every poller.

/// Default metric name prefix
pub const DEFAULT_PREFIX: &str = "eaton_usv_";

/// Label carrying the polled address
pub const LABEL_TARGET: &str = "target";
/// Label carrying the 1-based phase index
pub const LABEL_PHASE: &str = "phase";
/// Label carrying the decoded bad-input cause
pub const LABEL_CAUSE: &str = "cause";

/// Every kind of measurement the exporter produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Up,
    BatteryRemaining,
    BatteryCharge,
    InputVoltage,
    OutputVoltage,
    InputFrequency,
    OutputFrequency,
    OutputLoad,
    OutputPower,
    OnBattery,
    OnBypass,
    BadInput,
    AmbientTemp,
}

impl MetricKind {
    /// All kinds, in exposition order, which is also declaration order
    pub fn all() -> &'static [MetricKind] {
        &[
            Self::Up,
            Self::BatteryRemaining,
            Self::BatteryCharge,
            Self::InputVoltage,
            Self::OutputVoltage,
            Self::InputFrequency,
            Self::OutputFrequency,
            Self::OutputLoad,
            Self::OutputPower,
            Self::OnBattery,
            Self::OnBypass,
            Self::BadInput,
            Self::AmbientTemp,
        ]
    }

    /// Snake-case suffix appended to the prefix
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::BatteryRemaining => "battery_remaining",
            Self::BatteryCharge => "battery_charge",
            Self::InputVoltage => "input_voltage",
            Self::OutputVoltage => "output_voltage",
            Self::InputFrequency => "input_frequency",
            Self::OutputFrequency => "output_frequency",
            Self::OutputLoad => "output_load",
            Self::OutputPower => "output_power",
            Self::OnBattery => "on_battery",
            Self::OnBypass => "on_bypass",
            Self::BadInput => "bad_input",
            Self::AmbientTemp => "ambient_temp",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::Up => "Scrape of target was successful",
            Self::BatteryRemaining => "The time remaining actual charge vs actual load",
            Self::BatteryCharge => "The battery level as a percentage of charge",
            Self::InputVoltage => "The input phase voltage",
            Self::OutputVoltage => "The output phase voltage.",
            Self::InputFrequency => "The input frequency",
            Self::OutputFrequency => "The output frequency.",
            Self::OutputLoad => "The output load.",
            Self::OutputPower => "The output power in VA.",
            Self::OnBattery => "The UPS is running on battery (1 = yes, 0 = no)",
            Self::OnBypass => "The UPS is running on bypass (1 = yes, 0 = no)",
            Self::BadInput => "The utility input is out of tolerance (1 = yes, 0 = no)",
            Self::AmbientTemp => "The ambient temperature in the vicinity of the UPS (in degrees C)",
        }
    }

    fn labels(&self) -> &'static [&'static str] {
        match self {
            Self::InputVoltage
            | Self::OutputVoltage
            | Self::InputFrequency
            | Self::OutputFrequency
            | Self::OutputLoad
            | Self::OutputPower => &[LABEL_TARGET, LABEL_PHASE],
            Self::BadInput => &[LABEL_TARGET, LABEL_CAUSE],
            _ => &[LABEL_TARGET],
        }
    }
}

/// Immutable metric description: name, help text and ordered label names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub kind: MetricKind,
    pub name: String,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

/// The full descriptor table
#[derive(Debug, Clone)]
pub struct Catalogue {
    /// Indexed by `MetricKind as usize`
    descriptors: Vec<MetricDescriptor>,
}

impl Catalogue {
    pub fn new(prefix: &str) -> Self {
        let descriptors = MetricKind::all()
            .iter()
            .map(|&kind| MetricDescriptor {
                kind,
                name: format!("{}{}", prefix, kind.suffix()),
                help: kind.help(),
                labels: kind.labels(),
            })
            .collect();
        Self { descriptors }
    }

    /// Look up a descriptor
    pub fn get(&self, kind: MetricKind) -> &MetricDescriptor {
        &self.descriptors[kind as usize]
    }

    /// Descriptors in exposition order
    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter()
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

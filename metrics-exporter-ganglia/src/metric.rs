use std::{fmt, str::FromStr};

const DEFAULT_TMAX: u32 = 60;
const DEFAULT_DMAX: u32 = 0;

/// Value type of a metric, as declared in its metadata packet.
///
/// The value itself is always sent as a string, and the receiving `gmond` re-parses it according to the type it has
/// recorded for the metric.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ValueType {
    /// Unknown type.
    #[default]
    Unknown,

    /// Free-form string.
    String,

    /// Unsigned 16-bit integer.
    Uint16,

    /// Signed 16-bit integer.
    Int16,

    /// Unsigned 32-bit integer.
    Uint32,

    /// Signed 32-bit integer.
    Int32,

    /// Single-precision floating point.
    Float,

    /// Double-precision floating point.
    Double,
}

impl ValueType {
    /// Gets the value type for the given Ganglia type code.
    ///
    /// Unrecognized codes map to [`ValueType::Unknown`].
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => ValueType::String,
            2 => ValueType::Uint16,
            3 => ValueType::Int16,
            4 => ValueType::Uint32,
            5 => ValueType::Int32,
            6 => ValueType::Float,
            7 => ValueType::Double,
            _ => ValueType::Unknown,
        }
    }

    /// Gets the Ganglia type code.
    pub const fn code(self) -> u32 {
        match self {
            ValueType::Unknown => 0,
            ValueType::String => 1,
            ValueType::Uint16 => 2,
            ValueType::Int16 => 3,
            ValueType::Uint32 => 4,
            ValueType::Int32 => 5,
            ValueType::Float => 6,
            ValueType::Double => 7,
        }
    }

    /// Gets the type label carried in the metadata packet.
    pub const fn as_str(self) -> &'static str {
        match self {
            ValueType::Unknown => "unknown",
            ValueType::String => "string",
            ValueType::Uint16 => "uint16",
            ValueType::Int16 => "int16",
            ValueType::Uint32 => "uint32",
            ValueType::Int32 => "int32",
            ValueType::Float => "float",
            ValueType::Double => "double",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(ValueType::Unknown),
            "string" => Ok(ValueType::String),
            "uint16" => Ok(ValueType::Uint16),
            "int16" => Ok(ValueType::Int16),
            "uint32" => Ok(ValueType::Uint32),
            "int32" => Ok(ValueType::Int32),
            "float" => Ok(ValueType::Float),
            "double" => Ok(ValueType::Double),
            other => Err(format!("invalid value type '{}'", other)),
        }
    }
}

/// Slope of a metric, describing how `gmond` and the RRD backend should interpret successive values.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Slope {
    /// Value never changes.
    Zero,

    /// Value only increases, like a counter.
    Positive,

    /// Value only decreases.
    Negative,

    /// Value can both increase and decrease, like a gauge.
    #[default]
    Both,

    /// No slope information.
    Unspecified,
}

impl Slope {
    /// Gets the Ganglia slope code.
    pub const fn code(self) -> u32 {
        match self {
            Slope::Zero => 0,
            Slope::Positive => 1,
            Slope::Negative => 2,
            Slope::Both => 3,
            Slope::Unspecified => 4,
        }
    }
}

impl FromStr for Slope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(Slope::Zero),
            "positive" => Ok(Slope::Positive),
            "negative" => Ok(Slope::Negative),
            "both" => Ok(Slope::Both),
            "unspecified" => Ok(Slope::Unspecified),
            other => Err(format!("invalid slope '{}'", other)),
        }
    }
}

/// Selects which packets a send emits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PacketType {
    /// Only the metadata packet.
    Metadata,

    /// Only the value packet.
    Value,

    /// The metadata packet followed by the value packet.
    #[default]
    Both,
}

impl PacketType {
    /// Returns `true` if the metadata packet should be sent.
    pub const fn includes_metadata(self) -> bool {
        matches!(self, PacketType::Metadata | PacketType::Both)
    }

    /// Returns `true` if the value packet should be sent.
    pub const fn includes_value(self) -> bool {
        matches!(self, PacketType::Value | PacketType::Both)
    }
}

/// A single metric observation and its metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetricDescriptor {
    name: String,
    value: String,
    value_type: ValueType,
    units: String,
    slope: Slope,
    tmax: u32,
    dmax: u32,
    group: String,
}

impl MetricDescriptor {
    /// Creates a new `MetricDescriptor` with the given name, value, and value type.
    ///
    /// Units default to empty, the slope to [`Slope::Both`], `tmax` to 60 seconds, `dmax` to 0 (never expire), and
    /// no group is set.
    pub fn new<N, V>(name: N, value: V, value_type: ValueType) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        MetricDescriptor {
            name: name.into(),
            value: value.into(),
            value_type,
            units: String::new(),
            slope: Slope::default(),
            tmax: DEFAULT_TMAX,
            dmax: DEFAULT_DMAX,
            group: String::new(),
        }
    }

    /// Creates a `string` metric.
    pub fn string<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self::new(name, value, ValueType::String)
    }

    /// Creates a `uint16` metric.
    pub fn uint16<N: Into<String>>(name: N, value: u16) -> Self {
        Self::new(name, itoa::Buffer::new().format(value), ValueType::Uint16)
    }

    /// Creates an `int16` metric.
    pub fn int16<N: Into<String>>(name: N, value: i16) -> Self {
        Self::new(name, itoa::Buffer::new().format(value), ValueType::Int16)
    }

    /// Creates a `uint32` metric.
    pub fn uint32<N: Into<String>>(name: N, value: u32) -> Self {
        Self::new(name, itoa::Buffer::new().format(value), ValueType::Uint32)
    }

    /// Creates an `int32` metric.
    pub fn int32<N: Into<String>>(name: N, value: i32) -> Self {
        Self::new(name, itoa::Buffer::new().format(value), ValueType::Int32)
    }

    /// Creates a `float` metric.
    pub fn float<N: Into<String>>(name: N, value: f32) -> Self {
        Self::new(name, ryu::Buffer::new().format(value), ValueType::Float)
    }

    /// Creates a `double` metric.
    pub fn double<N: Into<String>>(name: N, value: f64) -> Self {
        Self::new(name, ryu::Buffer::new().format(value), ValueType::Double)
    }

    /// Sets the units.
    #[must_use]
    pub fn with_units<U: Into<String>>(mut self, units: U) -> Self {
        self.units = units.into();
        self
    }

    /// Sets the slope.
    #[must_use]
    pub fn with_slope(mut self, slope: Slope) -> Self {
        self.slope = slope;
        self
    }

    /// Sets the maximum number of seconds between updates before `gmond` considers the metric stale.
    #[must_use]
    pub fn with_tmax(mut self, tmax: u32) -> Self {
        self.tmax = tmax;
        self
    }

    /// Sets the number of seconds after which `gmond` deletes the metric if it has not been updated.
    ///
    /// Zero means the metric never expires.
    #[must_use]
    pub fn with_dmax(mut self, dmax: u32) -> Self {
        self.dmax = dmax;
        self
    }

    /// Sets the group the metric belongs to.
    ///
    /// An empty group is the same as no group.
    #[must_use]
    pub fn with_group<G: Into<String>>(mut self, group: G) -> Self {
        self.group = group.into();
        self
    }

    /// Gets the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the metric value in its string form.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Gets the declared value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Gets the units.
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Gets the slope.
    pub fn slope(&self) -> Slope {
        self.slope
    }

    /// Gets `tmax`, in seconds.
    pub fn tmax(&self) -> u32 {
        self.tmax
    }

    /// Gets `dmax`, in seconds.
    pub fn dmax(&self) -> u32 {
        self.dmax
    }

    /// Gets the group, if one is set.
    pub fn group(&self) -> Option<&str> {
        non_empty(&self.group)
    }
}

/// The identity a metric is reported under.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SenderIdentity {
    host: String,
    spoof: String,
}

impl SenderIdentity {
    /// Creates a new `SenderIdentity` reporting as `host`.
    pub fn new<H: Into<String>>(host: H) -> Self {
        SenderIdentity { host: host.into(), spoof: String::new() }
    }

    /// Reports on behalf of another host instead.
    ///
    /// Ganglia expects spoofed identities in the form `ip:hostname`. An empty value disables spoofing.
    #[must_use]
    pub fn with_spoof<S: Into<String>>(mut self, spoof: S) -> Self {
        self.spoof = spoof.into();
        self
    }

    /// Gets the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Gets the spoofed identity, if spoofing.
    pub fn spoof(&self) -> Option<&str> {
        non_empty(&self.spoof)
    }

    /// Resolves the identity that ends up on the wire.
    pub fn origin(&self) -> Origin<'_> {
        match self.spoof() {
            Some(spoof) => Origin { host: spoof, spoofed: true },
            None => Origin { host: &self.host, spoofed: false },
        }
    }
}

/// The effective sender of a packet, resolved once from a [`SenderIdentity`].
///
/// Both packets carry the effective host and the spoof flag, and they must agree with each other.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Origin<'a> {
    host: &'a str,
    spoofed: bool,
}

impl<'a> Origin<'a> {
    /// Gets the effective host.
    pub fn host(&self) -> &'a str {
        self.host
    }

    /// Returns `true` if the sender is reporting on behalf of another host.
    pub fn is_spoofed(&self) -> bool {
        self.spoofed
    }

    /// Gets the spoof flag as encoded on the wire.
    pub fn spoof_flag(&self) -> u32 {
        u32::from(self.spoofed)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::{MetricDescriptor, PacketType, SenderIdentity, Slope, ValueType};

    #[test]
    fn value_type_codes() {
        for code in 0..8 {
            assert_eq!(ValueType::from_code(code).code(), code);
        }

        assert_eq!(ValueType::from_code(8), ValueType::Unknown);
        assert_eq!(ValueType::from_code(u32::MAX).as_str(), "unknown");
        assert_eq!(ValueType::Uint32.as_str(), "uint32");
        assert_eq!(ValueType::Double.to_string(), "double");
    }

    #[test]
    fn parse_labels() {
        assert_eq!("UINT16".parse::<ValueType>(), Ok(ValueType::Uint16));
        assert_eq!("float".parse::<ValueType>(), Ok(ValueType::Float));
        assert!("decimal".parse::<ValueType>().is_err());

        assert_eq!("positive".parse::<Slope>(), Ok(Slope::Positive));
        assert_eq!("Both".parse::<Slope>().map(Slope::code), Ok(3));
        assert!("sideways".parse::<Slope>().is_err());
    }

    #[test]
    fn typed_constructors_format_values() {
        let cases = [
            (MetricDescriptor::uint32("a", 8_675_309), "8675309", ValueType::Uint32),
            (MetricDescriptor::int32("a", -42), "-42", ValueType::Int32),
            (MetricDescriptor::uint16("a", 65535), "65535", ValueType::Uint16),
            (MetricDescriptor::int16("a", -7), "-7", ValueType::Int16),
            (MetricDescriptor::double("a", 0.42), "0.42", ValueType::Double),
            (MetricDescriptor::float("a", 1.5), "1.5", ValueType::Float),
            (MetricDescriptor::string("a", "up"), "up", ValueType::String),
        ];

        for (descriptor, value, value_type) in cases {
            assert_eq!(descriptor.value(), value);
            assert_eq!(descriptor.value_type(), value_type);
        }
    }

    #[test]
    fn descriptor_defaults() {
        let descriptor = MetricDescriptor::new("cpu_load", "0.42", ValueType::Double);

        assert_eq!(descriptor.units(), "");
        assert_eq!(descriptor.slope(), Slope::Both);
        assert_eq!(descriptor.tmax(), 60);
        assert_eq!(descriptor.dmax(), 0);
        assert_eq!(descriptor.group(), None);
        assert_eq!(descriptor.with_group("").group(), None);
    }

    #[test]
    fn origin_resolution() {
        let plain = SenderIdentity::new("10.0.0.5");
        let origin = plain.origin();
        assert_eq!(origin.host(), "10.0.0.5");
        assert!(!origin.is_spoofed());
        assert_eq!(origin.spoof_flag(), 0);

        let empty_spoof = SenderIdentity::new("10.0.0.5").with_spoof("");
        assert_eq!(empty_spoof.origin(), plain.origin());

        let spoofed = SenderIdentity::new("10.0.0.5").with_spoof("10.0.0.9:proxyhost");
        let origin = spoofed.origin();
        assert_eq!(origin.host(), "10.0.0.9:proxyhost");
        assert!(origin.is_spoofed());
        assert_eq!(origin.spoof_flag(), 1);
    }

    #[test]
    fn packet_type_selection() {
        assert_eq!(PacketType::default(), PacketType::Both);
        assert!(PacketType::Both.includes_metadata() && PacketType::Both.includes_value());
        assert!(PacketType::Metadata.includes_metadata() && !PacketType::Metadata.includes_value());
        assert!(!PacketType::Value.includes_metadata() && PacketType::Value.includes_value());
    }
}

//! Typed ports and per-type channel mappings.
//!
//! Every node exposes an ordered list of ports. A port has a [`PortType`] and a
//! direction; the pair decides which arcs may attach to it (see
//! [`PortType::can_connect`]). [`ChannelConfig`] is built once when a plugin is
//! loaded and answers "which port is audio input channel 1?" in constant time.

/// Sentinel returned by unchecked port lookups.
pub const INVALID_PORT: u32 = u32::MAX;

/// The data carried by a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortType {
    /// One float per cycle.
    Control,
    /// One float per frame.
    Audio,
    /// Control voltage: audio-rate modulation.
    Cv,
    /// Structured message sequence.
    Atom,
    /// Generic event sequence.
    Event,
    /// MIDI message sequence.
    Midi,
    /// Anything the host does not understand. Never connects.
    Unknown,
}

impl PortType {
    /// Number of distinct port types, including `Unknown`.
    pub const COUNT: usize = 7;

    /// All port types in declaration order.
    pub const ALL: [PortType; Self::COUNT] = [
        PortType::Control,
        PortType::Audio,
        PortType::Cv,
        PortType::Atom,
        PortType::Event,
        PortType::Midi,
        PortType::Unknown,
    ];

    /// Stable numeric id of the type.
    #[inline]
    pub fn id(self) -> usize {
        match self {
            PortType::Control => 0,
            PortType::Audio => 1,
            PortType::Cv => 2,
            PortType::Atom => 3,
            PortType::Event => 4,
            PortType::Midi => 5,
            PortType::Unknown => 6,
        }
    }

    /// Inverse of [`id`](Self::id); out-of-range ids map to `Unknown`.
    pub fn from_id(id: usize) -> Self {
        Self::ALL.get(id).copied().unwrap_or(PortType::Unknown)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            PortType::Control => "Control",
            PortType::Audio => "Audio",
            PortType::Cv => "CV",
            PortType::Atom => "Atom",
            PortType::Event => "Event",
            PortType::Midi => "MIDI",
            PortType::Unknown => "Unknown",
        }
    }

    /// LV2 class URI for the type, if it has one.
    pub fn uri(self) -> Option<&'static str> {
        match self {
            PortType::Control => Some("http://lv2plug.in/ns/lv2core#ControlPort"),
            PortType::Audio => Some("http://lv2plug.in/ns/lv2core#AudioPort"),
            PortType::Cv => Some("http://lv2plug.in/ns/lv2core#CVPort"),
            PortType::Atom => Some("http://lv2plug.in/ns/ext/atom#AtomPort"),
            PortType::Event => Some("http://lv2plug.in/ns/ext/event#EventPort"),
            PortType::Midi => Some("http://lv2plug.in/ns/ext/midi#MidiEvent"),
            PortType::Unknown => None,
        }
    }

    /// Parses an LV2 class URI. Unrecognised URIs yield `Unknown`.
    pub fn from_uri(uri: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.uri() == Some(uri))
            .unwrap_or(PortType::Unknown)
    }

    /// Whether data of this type is a per-frame float buffer.
    #[inline]
    pub fn is_audio_rate(self) -> bool {
        matches!(self, PortType::Audio | PortType::Cv)
    }

    /// Whether ports of this type carry an event sequence.
    #[inline]
    pub fn is_sequence(self) -> bool {
        matches!(self, PortType::Atom | PortType::Event | PortType::Midi)
    }

    /// Connection legality between a source and a destination port type.
    ///
    /// Same types always connect. Audio and Control may additionally feed CV.
    /// `Unknown` never connects to anything.
    pub fn can_connect(source: PortType, dest: PortType) -> bool {
        if source == PortType::Unknown || dest == PortType::Unknown {
            return false;
        }
        if source == dest {
            return true;
        }
        matches!(
            (source, dest),
            (PortType::Audio, PortType::Cv) | (PortType::Control, PortType::Cv)
        )
    }

    /// Shorthand for `PortType::can_connect(self, dest)`.
    #[inline]
    pub fn can_connect_to(self, dest: PortType) -> bool {
        Self::can_connect(self, dest)
    }
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Value range of a control port.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortRange {
    /// Lowest value.
    pub min: f32,
    /// Highest value.
    pub max: f32,
    /// Value at instantiation.
    pub default: f32,
}

impl PortRange {
    /// Creates a range.
    pub fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    /// Clamps `value` into the range.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            default: 0.0,
        }
    }
}

/// Full description of one port on a node.
#[derive(Clone, Debug, PartialEq)]
pub struct PortDescription {
    /// Position in the owning node's port list.
    pub index: u32,
    /// Data type.
    pub port_type: PortType,
    /// `true` for inputs, `false` for outputs.
    pub input: bool,
    /// Position among ports of the same type and direction.
    pub channel: u32,
    /// Machine identifier, unique within the node.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Range for control ports.
    pub range: PortRange,
}

impl PortDescription {
    /// Whether this is an output port.
    #[inline]
    pub fn is_output(&self) -> bool {
        !self.input
    }
}

/// Ordered port indices for one direction, grouped by type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelMapping {
    ports: [Vec<u32>; PortType::COUNT],
}

impl ChannelMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `port` as the next channel of `port_type`. Returns its channel number.
    pub fn add(&mut self, port_type: PortType, port: u32) -> u32 {
        let list = &mut self.ports[port_type.id()];
        list.push(port);
        (list.len() - 1) as u32
    }

    /// Port index of channel `channel` of `port_type`, if it exists.
    #[inline]
    pub fn port(&self, port_type: PortType, channel: usize) -> Option<u32> {
        self.ports[port_type.id()].get(channel).copied()
    }

    /// Like [`port`](Self::port) but returns [`INVALID_PORT`] when missing.
    #[inline]
    pub fn port_unchecked(&self, port_type: PortType, channel: usize) -> u32 {
        self.port(port_type, channel).unwrap_or(INVALID_PORT)
    }

    /// Channel number of `port`, if it belongs to `port_type` in this mapping.
    pub fn channel(&self, port_type: PortType, port: u32) -> Option<usize> {
        self.ports[port_type.id()].iter().position(|&p| p == port)
    }

    /// Number of channels of `port_type`.
    #[inline]
    pub fn num_channels(&self, port_type: PortType) -> usize {
        self.ports[port_type.id()].len()
    }

    /// All port indices of `port_type`, in channel order.
    #[inline]
    pub fn ports(&self, port_type: PortType) -> &[u32] {
        &self.ports[port_type.id()]
    }

    /// Whether `port` is mapped under any type.
    pub fn contains(&self, port: u32) -> bool {
        self.ports.iter().any(|list| list.contains(&port))
    }

    /// Total number of mapped ports.
    pub fn len(&self) -> usize {
        self.ports.iter().map(Vec::len).sum()
    }

    /// Whether no port is mapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input and output channel mappings of one module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    inputs: ChannelMapping,
    outputs: ChannelMapping,
}

impl ChannelConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the configuration from a module's port list, assigning channel numbers.
    pub fn from_ports(ports: &mut [PortDescription]) -> Self {
        let mut config = Self::new();
        for port in ports.iter_mut() {
            port.channel = config.add_port(port.port_type, port.index, port.input);
        }
        config
    }

    /// Registers a port. Returns its channel number.
    pub fn add_port(&mut self, port_type: PortType, index: u32, input: bool) -> u32 {
        if input {
            self.inputs.add(port_type, index)
        } else {
            self.outputs.add(port_type, index)
        }
    }

    /// Input mapping.
    pub fn inputs(&self) -> &ChannelMapping {
        &self.inputs
    }

    /// Output mapping.
    pub fn outputs(&self) -> &ChannelMapping {
        &self.outputs
    }

    /// Port index of a channel in the given direction.
    pub fn port(&self, port_type: PortType, channel: usize, input: bool) -> Option<u32> {
        if input {
            self.inputs.port(port_type, channel)
        } else {
            self.outputs.port(port_type, channel)
        }
    }

    /// Number of channels of a type in the given direction.
    pub fn num_channels(&self, port_type: PortType, input: bool) -> usize {
        if input {
            self.inputs.num_channels(port_type)
        } else {
            self.outputs.num_channels(port_type)
        }
    }
}

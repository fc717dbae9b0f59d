//! Declared parameter shapes of jobs.
//!
//! A shape lists positional device groups followed by named options. Groups
//! are repeated in fixed-size chunks; options are matched by exact flag.

/// Which devices a device field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Any readable device; motors can be read too.
    Detector,
    /// Only movable devices.
    Motor,
}

/// Type of one element inside a device group chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A device name resolved through the namespace.
    Device(DeviceRole),
    /// A floating-point literal.
    Float,
    /// An integer literal.
    Int,
}

/// How a group's converted values are placed in the positional arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// The whole group becomes one list argument.
    List,
    /// Each value becomes its own positional argument.
    Flatten,
}

/// A positional slot made of repeated fixed-size chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGroup {
    name: String,
    flags: Vec<String>,
    fields: Vec<FieldKind>,
    min: usize,
    max: Option<usize>,
    packing: Packing,
}

impl DeviceGroup {
    /// Creates a group whose chunks have the given field layout.
    ///
    /// The group defaults to at least one chunk, no upper bound, no flags,
    /// and flattened packing.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldKind>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
            fields,
            min: 1,
            max: None,
            packing: Packing::Flatten,
        }
    }

    /// A list of detectors addressed positionally or with `-d/--detectors`.
    #[must_use]
    pub fn detectors() -> Self {
        Self::new("detectors", vec![FieldKind::Device(DeviceRole::Detector)])
            .with_flags(["-d", "--detectors"])
            .with_packing(Packing::List)
    }

    /// Adds flag spellings that redirect following tokens into this group.
    #[must_use]
    pub fn with_flags<const N: usize>(mut self, flags: [&str; N]) -> Self {
        self.flags = flags.iter().map(|flag| (*flag).to_owned()).collect();
        self
    }

    /// Sets the repetition bounds.
    #[must_use]
    pub const fn with_repeat(mut self, min: usize, max: Option<usize>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets how values are placed in the positional arguments.
    #[must_use]
    pub const fn with_packing(mut self, packing: Packing) -> Self {
        self.packing = packing;
        self
    }

    /// Group name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flag spellings addressing this group.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Layout of one chunk.
    #[must_use]
    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    /// Minimum number of chunks.
    #[must_use]
    pub const fn min(&self) -> usize {
        self.min
    }

    /// Maximum number of chunks, if bounded.
    #[must_use]
    pub const fn max(&self) -> Option<usize> {
        self.max
    }

    /// Packing of converted values.
    #[must_use]
    pub const fn packing(&self) -> Packing {
        self.packing
    }

    /// Returns `true` when the group holds only detectors.
    #[must_use]
    pub fn is_detector_slot(&self) -> bool {
        self.fields == [FieldKind::Device(DeviceRole::Detector)]
    }

    /// Returns `true` when `flag` addresses this group.
    #[must_use]
    pub fn matches_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|candidate| candidate == flag)
    }
}

/// Type of a named option's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// One integer value.
    Int,
    /// One floating-point value.
    Float,
    /// One text value.
    Text,
    /// One device name resolved through the namespace.
    Device(DeviceRole),
    /// No value; presence sets the option to `true`.
    Switch,
    /// Any number of `key=value` pairs.
    Metadata,
}

/// A named optional (or required) parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    name: String,
    flags: Vec<String>,
    kind: OptionKind,
    required: bool,
}

impl OptionSpec {
    /// Creates an option sent as keyword argument `name`, addressed by
    /// `--name` unless other flags are given.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        let keyword: String = name.into();
        let flags = vec![format!("--{keyword}")];
        Self {
            name: keyword,
            flags,
            kind,
            required: false,
        }
    }

    /// The `--md key=value ...` option accepted by every job.
    #[must_use]
    pub fn metadata() -> Self {
        Self::new("md", OptionKind::Metadata)
    }

    /// Replaces the flag spellings.
    #[must_use]
    pub fn with_flags<const N: usize>(mut self, flags: [&str; N]) -> Self {
        self.flags = flags.iter().map(|flag| (*flag).to_owned()).collect();
        self
    }

    /// Marks the option as mandatory.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Keyword argument name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flag spellings.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Preferred flag spelling for diagnostics.
    #[must_use]
    pub fn display_flag(&self) -> &str {
        self.flags
            .iter()
            .find(|flag| flag.starts_with("--"))
            .or_else(|| self.flags.first())
            .map_or(self.name.as_str(), String::as_str)
    }

    /// Value type.
    #[must_use]
    pub const fn kind(&self) -> OptionKind {
        self.kind
    }

    /// Whether the option must be supplied.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns `true` when `flag` addresses this option.
    #[must_use]
    pub fn matches_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|candidate| candidate == flag)
    }
}

/// Ordered device groups followed by named options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterShape {
    groups: Vec<DeviceGroup>,
    options: Vec<OptionSpec>,
}

impl ParameterShape {
    /// Creates a shape; the metadata option is always appended.
    #[must_use]
    pub fn new(groups: Vec<DeviceGroup>, mut options: Vec<OptionSpec>) -> Self {
        options.push(OptionSpec::metadata());
        Self { groups, options }
    }

    /// Positional device groups in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[DeviceGroup] {
        &self.groups
    }

    /// Named options.
    #[must_use]
    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    /// Returns `true` when any group or option accepts detectors.
    #[must_use]
    pub fn accepts_detectors(&self) -> bool {
        self.groups.iter().any(DeviceGroup::is_detector_slot)
    }
}

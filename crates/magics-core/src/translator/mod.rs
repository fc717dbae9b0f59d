//! Translation of tokenised command input into job requests.
//!
//! The [`Translator`] runs in four passes over the tokens, each of which can
//! fail before anything is built:
//!
//! 1. A capability check rejects detector input for jobs without detectors.
//! 2. Tokens are split into device groups and named options.
//! 3. Every device group is checked against its arity constraints.
//! 4. Values are converted and devices resolved through the [`Namespace`].
//!
//! Only when all passes succeed is a [`JobRequest`] created, with a fresh
//! correlation id.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::device::DeviceKind;
use crate::error::TranslateError;
use crate::metadata::{MetadataStore, split_pair};
use crate::namespace::Namespace;
use crate::registry::JobDescriptor;
use crate::request::{ArgValue, JobRequest};
use crate::shape::{DeviceGroup, DeviceRole, FieldKind, OptionKind, OptionSpec, Packing};

const DETECTOR_FLAGS: [&str; 2] = ["-d", "--detectors"];

/// Converts invocations into [`JobRequest`]s against a shared namespace.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    namespace: &'a Namespace,
    metadata: Option<&'a MetadataStore>,
}

impl<'a> Translator<'a> {
    /// Creates a translator resolving devices through `namespace`.
    #[must_use]
    pub const fn new(namespace: &'a Namespace) -> Self {
        Self {
            namespace,
            metadata: None,
        }
    }

    /// Merges session metadata into every translated request.
    #[must_use]
    pub const fn with_metadata(mut self, metadata: &'a MetadataStore) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Translates `tokens` against `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] describing the first problem found. No
    /// request exists when an error is returned.
    pub fn translate(
        &self,
        descriptor: &Arc<JobDescriptor>,
        tokens: &[String],
    ) -> Result<JobRequest, TranslateError> {
        self.check_capabilities(descriptor, tokens)?;
        let split = SplitTokens::split(descriptor, tokens)?;

        let groups = descriptor.shape().groups();
        for (group, group_tokens) in groups.iter().zip(&split.groups) {
            check_arity(group, group_tokens)?;
        }

        let mut args = Vec::new();
        for (group, group_tokens) in groups.iter().zip(&split.groups) {
            if group_tokens.is_empty() {
                continue;
            }
            let values = self.convert_group(group, group_tokens)?;
            match group.packing() {
                Packing::List => args.push(ArgValue::List(values)),
                Packing::Flatten => args.extend(values),
            }
        }

        let kwargs = self.convert_options(descriptor.shape().options(), &split.options)?;
        Ok(JobRequest::new(Arc::clone(descriptor), args, kwargs))
    }

    fn check_capabilities(
        &self,
        descriptor: &JobDescriptor,
        tokens: &[String],
    ) -> Result<(), TranslateError> {
        if descriptor.has_detectors() {
            return Ok(());
        }
        let offending = tokens.iter().find(|token| {
            DETECTOR_FLAGS.contains(&token.as_str())
                || (!is_flag(token)
                    && self.namespace.device_kind(token) == Some(DeviceKind::Detector))
        });
        match offending {
            Some(token) => Err(TranslateError::CapabilityViolation {
                alias: descriptor.alias().to_owned(),
                token: token.clone(),
            }),
            None => Ok(()),
        }
    }

    fn convert_group(
        &self,
        group: &DeviceGroup,
        tokens: &[&str],
    ) -> Result<Vec<ArgValue>, TranslateError> {
        let mut values = Vec::with_capacity(tokens.len());
        for chunk in tokens.chunks_exact(group.fields().len().max(1)) {
            for (field, token) in group.fields().iter().zip(chunk) {
                values.push(self.convert_field(*field, token)?);
            }
        }
        Ok(values)
    }

    fn convert_field(&self, field: FieldKind, token: &str) -> Result<ArgValue, TranslateError> {
        match field {
            FieldKind::Device(role) => self.resolve_device(token, role),
            FieldKind::Float => parse_float(token).map(ArgValue::Float),
            FieldKind::Int => parse_int(token).map(ArgValue::Int),
        }
    }

    fn resolve_device(&self, token: &str, role: DeviceRole) -> Result<ArgValue, TranslateError> {
        let entry = self.namespace.get_from_namespace(token).map_err(|_| {
            TranslateError::UnresolvedDevice {
                token: token.to_owned(),
            }
        })?;
        let device = entry
            .as_device()
            .ok_or_else(|| TranslateError::argument_type(token, "a device"))?;
        if role == DeviceRole::Motor && !device.kind().is_movable() {
            return Err(TranslateError::argument_type(token, "a movable device"));
        }
        Ok(ArgValue::Device(device.clone()))
    }

    fn convert_options(
        &self,
        specs: &[OptionSpec],
        given: &BTreeMap<usize, GivenOption<'_>>,
    ) -> Result<BTreeMap<String, ArgValue>, TranslateError> {
        let mut kwargs = BTreeMap::new();
        let mut explicit_md = BTreeMap::new();

        for (index, spec) in specs.iter().enumerate() {
            let Some(option) = given.get(&index) else {
                if spec.is_required() {
                    return Err(TranslateError::MissingArgument {
                        flag: spec.display_flag().to_owned(),
                    });
                }
                continue;
            };
            match spec.kind() {
                OptionKind::Switch => {
                    kwargs.insert(spec.name().to_owned(), ArgValue::Bool(true));
                }
                OptionKind::Metadata => {
                    for token in &option.values {
                        let (key, value) = split_pair(token)
                            .ok_or_else(|| TranslateError::argument_type(token, "a key=value pair"))?;
                        explicit_md.insert(key.to_owned(), value.to_owned());
                    }
                }
                OptionKind::Int | OptionKind::Float | OptionKind::Text | OptionKind::Device(_) => {
                    let value = self.convert_option_value(spec.kind(), option)?;
                    kwargs.insert(spec.name().to_owned(), value);
                }
            }
        }

        let mut md = self.metadata.map(MetadataStore::entries).unwrap_or_default();
        md.extend(explicit_md);
        if !md.is_empty() {
            kwargs.insert(String::from("md"), ArgValue::Map(md));
        }
        Ok(kwargs)
    }

    fn convert_option_value(
        &self,
        kind: OptionKind,
        option: &GivenOption<'_>,
    ) -> Result<ArgValue, TranslateError> {
        let Some(token) = option.values.first() else {
            return Err(TranslateError::argument_type(option.flag, "a value"));
        };
        match kind {
            OptionKind::Int => parse_int(token).map(ArgValue::Int),
            OptionKind::Float => parse_float(token).map(ArgValue::Float),
            OptionKind::Device(role) => self.resolve_device(token, role),
            OptionKind::Text | OptionKind::Switch | OptionKind::Metadata => {
                Ok(ArgValue::Text((*token).to_owned()))
            }
        }
    }
}

/// Tokens routed to a named option, with the flag spelling that introduced them.
#[derive(Debug)]
struct GivenOption<'t> {
    flag: &'t str,
    values: Vec<&'t str>,
}

/// Tokens split into device groups and options.
#[derive(Debug)]
struct SplitTokens<'t> {
    groups: Vec<Vec<&'t str>>,
    options: BTreeMap<usize, GivenOption<'t>>,
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Positional,
    Group(usize),
    Named(usize),
}

impl<'t> SplitTokens<'t> {
    fn split(descriptor: &JobDescriptor, tokens: &'t [String]) -> Result<Self, TranslateError> {
        let shape = descriptor.shape();
        let mut split = Self {
            groups: vec![Vec::new(); shape.groups().len()],
            options: BTreeMap::new(),
        };
        let mut cursor = Cursor::Positional;

        for token in tokens.iter().map(String::as_str) {
            if is_flag(token) {
                cursor = split.enter_flag(descriptor, token)?;
                continue;
            }
            match cursor {
                Cursor::Group(index) => split.push_group(index, token),
                Cursor::Named(index) => {
                    if let Some(option) = split.options.get_mut(&index) {
                        option.values.push(token);
                    }
                    let repeats = shape
                        .options()
                        .get(index)
                        .is_some_and(|spec| spec.kind() == OptionKind::Metadata);
                    if !repeats {
                        cursor = Cursor::Positional;
                    }
                }
                Cursor::Positional => {
                    if shape.groups().is_empty() {
                        return Err(TranslateError::UnknownArgument {
                            alias: descriptor.alias().to_owned(),
                            flag: token.to_owned(),
                        });
                    }
                    split.push_group(0, token);
                }
            }
        }
        Ok(split)
    }

    fn enter_flag(
        &mut self,
        descriptor: &JobDescriptor,
        flag: &'t str,
    ) -> Result<Cursor, TranslateError> {
        let shape = descriptor.shape();
        if let Some(index) = shape.groups().iter().position(|group| group.matches_flag(flag)) {
            return Ok(Cursor::Group(index));
        }
        let Some((index, spec)) = shape
            .options()
            .iter()
            .enumerate()
            .find(|(_, spec)| spec.matches_flag(flag))
        else {
            return Err(TranslateError::UnknownArgument {
                alias: descriptor.alias().to_owned(),
                flag: flag.to_owned(),
            });
        };

        let previous = self.options.remove(&index);
        let values = match (spec.kind(), previous) {
            (OptionKind::Metadata, Some(earlier)) => earlier.values,
            _ => Vec::new(),
        };
        self.options.insert(index, GivenOption { flag, values });
        Ok(match spec.kind() {
            OptionKind::Switch => Cursor::Positional,
            _ => Cursor::Named(index),
        })
    }

    fn push_group(&mut self, index: usize, token: &'t str) {
        if let Some(group) = self.groups.get_mut(index) {
            group.push(token);
        }
    }
}

fn check_arity(group: &DeviceGroup, tokens: &[&str]) -> Result<(), TranslateError> {
    let size = group.fields().len().max(1);
    let chunks = tokens.chunks_exact(size);
    if !chunks.remainder().is_empty() {
        return Err(TranslateError::Arity {
            group: group.name().to_owned(),
            detail: format!(
                "values come in groups of {size}, but {} were given",
                tokens.len()
            ),
        });
    }

    let repetitions = chunks.len();
    if repetitions < group.min() {
        return Err(TranslateError::Arity {
            group: group.name().to_owned(),
            detail: format!(
                "at least {} required, {repetitions} given",
                group.min()
            ),
        });
    }
    if let Some(max) = group.max().filter(|max| repetitions > *max) {
        return Err(TranslateError::Arity {
            group: group.name().to_owned(),
            detail: format!("at most {max} allowed, {repetitions} given"),
        });
    }
    Ok(())
}

/// Returns `true` for flag tokens; negative numbers are values.
fn is_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && token.parse::<f64>().is_err()
}

fn parse_float(token: &str) -> Result<f64, TranslateError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| TranslateError::argument_type(token, "a number"))
}

fn parse_int(token: &str) -> Result<i64, TranslateError> {
    token
        .parse::<i64>()
        .map_err(|_| TranslateError::argument_type(token, "an integer"))
}

#[cfg(test)]
mod tests;

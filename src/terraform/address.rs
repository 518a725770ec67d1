use std::cmp::Ordering;
use std::fmt;

use super::StateError;

/// Instance key of a resource or module using `count` or `for_each`.
///
/// Variant order is the sort order: no key, then int keys, then string keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum InstanceKey {
    #[default]
    NoKey,
    Int(i64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{}]", i),
            InstanceKey::Str(s) => {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "[\"{}\"]", escaped)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleStep {
    pub name: String,
    pub key: InstanceKey,
}

/// Path from the root module to a module instance. Empty means root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ModuleInstance(pub Vec<ModuleStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(mut self, name: impl Into<String>, key: InstanceKey) -> Self {
        self.0.push(ModuleStep {
            name: name.into(),
            key,
        });
        self
    }

    /// Parses a module instance address such as `module.net.module.subnet["a"]`.
    pub fn parse(input: &str) -> Result<Self, StateError> {
        let invalid = |reason: &str| StateError::InvalidAddress {
            address: input.to_string(),
            reason: reason.to_string(),
        };

        let mut steps = Vec::new();
        let mut rest = input;

        while !rest.is_empty() {
            rest = rest
                .strip_prefix("module.")
                .ok_or_else(|| invalid("expected \"module.\""))?;

            let name_end = rest.find(['.', '[']).unwrap_or(rest.len());
            let name = &rest[..name_end];
            if name.is_empty() {
                return Err(invalid("empty module name"));
            }
            rest = &rest[name_end..];

            let mut key = InstanceKey::NoKey;
            if let Some(after_bracket) = rest.strip_prefix('[') {
                let (parsed, remaining) = parse_key(after_bracket).map_err(|r| invalid(r))?;
                key = parsed;
                rest = remaining;
            }

            steps.push(ModuleStep {
                name: name.to_string(),
                key,
            });

            if !rest.is_empty() {
                rest = rest
                    .strip_prefix('.')
                    .ok_or_else(|| invalid("expected \".\" between module steps"))?;
                if rest.is_empty() {
                    return Err(invalid("trailing \".\""));
                }
            }
        }

        Ok(Self(steps))
    }
}

/// Parses the body of an index bracket, returning the key and the text after `]`.
fn parse_key(input: &str) -> Result<(InstanceKey, &str), &'static str> {
    if let Some(quoted) = input.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => return Err("unterminated escape in index key"),
                },
                '"' => {
                    let after = &quoted[i + 1..];
                    let rest = after
                        .strip_prefix(']')
                        .ok_or("expected \"]\" after string key")?;
                    return Ok((InstanceKey::Str(value), rest));
                }
                other => value.push(other),
            }
        }
        Err("unterminated string key")
    } else {
        let end = input.find(']').ok_or("unterminated index key")?;
        let index = input[..end]
            .trim()
            .parse::<i64>()
            .map_err(|_| "index key is neither a number nor a string")?;
        Ok((InstanceKey::Int(index), &input[end + 1..]))
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

impl Ord for ModuleInstance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| {
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key)))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }
}

impl PartialOrd for ModuleInstance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Data resources sort before managed resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceMode {
    Data,
    Managed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceAddr {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl ResourceAddr {
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode == ResourceMode::Data {
            f.write_str("data.")?;
        }
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

/// Absolute address of one resource instance.
///
/// Field order drives the derived ordering: module path, then mode, type,
/// name and finally the instance key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceInstanceAddr {
    pub module: ModuleInstance,
    pub resource: ResourceAddr,
    pub key: InstanceKey,
}

impl ResourceInstanceAddr {
    pub fn new(module: ModuleInstance, resource: ResourceAddr, key: InstanceKey) -> Self {
        Self {
            module,
            resource,
            key,
        }
    }

    pub fn mode(&self) -> ResourceMode {
        self.resource.mode
    }

    pub fn type_name(&self) -> &str {
        &self.resource.type_name
    }
}

impl fmt::Display for ResourceInstanceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "{}{}", self.resource, self.key)
    }
}

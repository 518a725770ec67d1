//! Terraform state reader.
//!
//! Parses tfstate v4 files directly and upgrades v3 files in memory. Only the
//! parts needed to enumerate resource instances and their ids are kept.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::StateError;
use super::address::{InstanceKey, ModuleInstance, ResourceAddr, ResourceInstanceAddr, ResourceMode};

#[derive(Debug, Clone, Default)]
pub struct State {
    pub version: u64,
    pub terraform_version: Option<String>,
    pub serial: u64,
    pub lineage: Option<String>,
    resources: BTreeMap<(ModuleInstance, ResourceAddr), Resource>,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub module: ModuleInstance,
    pub addr: ResourceAddr,
    pub instances: BTreeMap<InstanceKey, ResourceInstance>,
}

impl Resource {
    pub fn instance_addr(&self, key: InstanceKey) -> ResourceInstanceAddr {
        ResourceInstanceAddr::new(self.module.clone(), self.addr.clone(), key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceInstance {
    pub current: Option<InstanceObject>,
    pub deposed: BTreeMap<String, InstanceObject>,
}

impl ResourceInstance {
    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceObject {
    pub attributes: Option<Value>,
    pub attributes_flat: BTreeMap<String, String>,
}

impl InstanceObject {
    /// Remote id of the object, as recorded by the provider.
    pub fn id(&self) -> Option<String> {
        let from_json = self
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        from_json
            .or_else(|| self.attributes_flat.get("id").cloned())
            .filter(|id| !id.is_empty())
    }
}

/// Opens and parses the state file at `path`.
pub fn read_state_file(path: impl AsRef<Path>) -> Result<State, StateError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(StateError::Open)?;
    State::from_reader(BufReader::new(file), path)
}

impl State {
    /// Parses a state file from `reader`; `path` is only used in error messages.
    pub fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self, StateError> {
        let parse_err = |source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let value: Value = serde_json::from_reader(reader).map_err(parse_err)?;
        let header: VersionHeader = serde_json::from_value(value.clone()).map_err(parse_err)?;

        match header.version {
            4 => {
                let raw: StateV4 = serde_json::from_value(value).map_err(parse_err)?;
                Self::from_v4(raw)
            }
            3 => {
                let raw: StateV3 = serde_json::from_value(value).map_err(parse_err)?;
                Self::from_v3(raw)
            }
            other => Err(StateError::UnsupportedVersion(other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every resource instance address in every module, sorted.
    pub fn resource_instance_addrs(&self) -> Vec<ResourceInstanceAddr> {
        let mut ret: Vec<ResourceInstanceAddr> = self
            .resources
            .values()
            .flat_map(|rs| rs.instances.keys().map(|key| rs.instance_addr(key.clone())))
            .collect();
        ret.sort();
        ret
    }

    pub fn resource_instance(&self, addr: &ResourceInstanceAddr) -> Option<&ResourceInstance> {
        self.resources
            .get(&(addr.module.clone(), addr.resource.clone()))?
            .instances
            .get(&addr.key)
    }

    fn insert_object(
        &mut self,
        addr: ResourceInstanceAddr,
        deposed: Option<String>,
        object: InstanceObject,
    ) -> Result<(), StateError> {
        let ResourceInstanceAddr {
            module,
            resource,
            key,
        } = addr;

        let entry = self
            .resources
            .entry((module.clone(), resource.clone()))
            .or_insert_with(|| Resource {
                module: module.clone(),
                addr: resource.clone(),
                instances: BTreeMap::new(),
            });

        let instance = entry.instances.entry(key.clone()).or_default();
        match deposed {
            Some(deposed_key) => {
                instance.deposed.insert(deposed_key, object);
            }
            None if instance.current.is_some() => {
                let addr = ResourceInstanceAddr::new(module, resource, key);
                return Err(StateError::DuplicateInstance(addr.to_string()));
            }
            None => instance.current = Some(object),
        }
        Ok(())
    }

    fn from_v4(raw: StateV4) -> Result<Self, StateError> {
        let mut state = State {
            version: 4,
            terraform_version: raw.terraform_version,
            serial: raw.serial,
            lineage: raw.lineage,
            resources: BTreeMap::new(),
        };

        for rs in raw.resources {
            let module = ModuleInstance::parse(&rs.module)?;
            let mode = match rs.mode.as_str() {
                "managed" => ResourceMode::Managed,
                "data" => ResourceMode::Data,
                other => return Err(StateError::InvalidMode(other.to_string())),
            };
            let resource = ResourceAddr {
                mode,
                type_name: rs.type_,
                name: rs.name,
            };

            if rs.instances.is_empty() {
                // Resources with no instances still take part in lookups.
                state
                    .resources
                    .entry((module.clone(), resource.clone()))
                    .or_insert_with(|| Resource {
                        module: module.clone(),
                        addr: resource.clone(),
                        instances: BTreeMap::new(),
                    });
                continue;
            }

            for inst in rs.instances {
                let key = match inst.index_key {
                    None => InstanceKey::NoKey,
                    Some(IndexKeyV4::Int(i)) => InstanceKey::Int(i),
                    Some(IndexKeyV4::Str(s)) => InstanceKey::Str(s),
                };
                let object = InstanceObject {
                    attributes: inst.attributes,
                    attributes_flat: inst.attributes_flat.unwrap_or_default(),
                };
                let addr = ResourceInstanceAddr::new(module.clone(), resource.clone(), key);
                state.insert_object(addr, inst.deposed, object)?;
            }
        }

        Ok(state)
    }

    fn from_v3(raw: StateV3) -> Result<Self, StateError> {
        let mut state = State {
            version: 3,
            terraform_version: raw.terraform_version,
            serial: raw.serial,
            lineage: raw.lineage,
            resources: BTreeMap::new(),
        };

        for ms in raw.modules {
            let module = module_from_v3_path(&ms.path)?;

            for (key, rs) in ms.resources {
                let (resource, instance_key) = parse_v3_resource_key(&key)?;
                let addr = ResourceInstanceAddr::new(module.clone(), resource, instance_key);

                if let Some(primary) = rs.primary {
                    state.insert_object(addr.clone(), None, primary.upgrade())?;
                }
                for (i, deposed) in rs.deposed.into_iter().enumerate() {
                    let deposed_key = format!("{:08x}", i);
                    state.insert_object(addr.clone(), Some(deposed_key), deposed.upgrade())?;
                }
            }
        }

        Ok(state)
    }
}

fn module_from_v3_path(path: &[String]) -> Result<ModuleInstance, StateError> {
    match path.split_first() {
        None => Ok(ModuleInstance::root()),
        Some((first, rest)) if first == "root" => Ok(rest.iter().fold(
            ModuleInstance::root(),
            |module, name| module.child(name.clone(), InstanceKey::NoKey),
        )),
        Some(_) => Err(StateError::InvalidAddress {
            address: path.join("."),
            reason: "module path must start with \"root\"".to_string(),
        }),
    }
}

/// Splits a v3 resource key such as `data.aws_ami.base` or `aws_instance.web.2`.
fn parse_v3_resource_key(key: &str) -> Result<(ResourceAddr, InstanceKey), StateError> {
    let invalid = || StateError::InvalidAddress {
        address: key.to_string(),
        reason: "expected [data.]TYPE.NAME[.INDEX]".to_string(),
    };

    let mut parts: Vec<&str> = key.split('.').collect();
    let mode = if parts.first() == Some(&"data") {
        parts.remove(0);
        ResourceMode::Data
    } else {
        ResourceMode::Managed
    };

    let (type_name, name, instance_key) = match parts.as_slice() {
        [type_name, name] => (*type_name, *name, InstanceKey::NoKey),
        [type_name, name, index] => {
            let index = index.parse::<i64>().map_err(|_| invalid())?;
            (*type_name, *name, InstanceKey::Int(index))
        }
        _ => return Err(invalid()),
    };
    if type_name.is_empty() || name.is_empty() {
        return Err(invalid());
    }

    let resource = ResourceAddr {
        mode,
        type_name: type_name.to_string(),
        name: name.to_string(),
    };
    Ok((resource, instance_key))
}

#[derive(Debug, Deserialize)]
struct VersionHeader {
    version: u64,
}

#[derive(Debug, Deserialize)]
struct StateV4 {
    terraform_version: Option<String>,
    #[serde(default)]
    serial: u64,
    lineage: Option<String>,
    #[serde(default)]
    resources: Vec<ResourceV4>,
}

fn default_mode() -> String {
    "managed".to_string()
}

#[derive(Debug, Deserialize)]
struct ResourceV4 {
    #[serde(default)]
    module: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(rename = "type")]
    type_: String,
    name: String,
    #[serde(default)]
    instances: Vec<InstanceV4>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexKeyV4 {
    Int(i64),
    Str(String),
}

#[derive(Debug, Deserialize)]
struct InstanceV4 {
    index_key: Option<IndexKeyV4>,
    deposed: Option<String>,
    attributes: Option<Value>,
    attributes_flat: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StateV3 {
    terraform_version: Option<String>,
    #[serde(default)]
    serial: u64,
    lineage: Option<String>,
    #[serde(default)]
    modules: Vec<ModuleV3>,
}

#[derive(Debug, Deserialize)]
struct ModuleV3 {
    #[serde(default)]
    path: Vec<String>,
    #[serde(default)]
    resources: BTreeMap<String, ResourceV3>,
}

#[derive(Debug, Deserialize)]
struct ResourceV3 {
    primary: Option<InstanceV3>,
    #[serde(default)]
    deposed: Vec<InstanceV3>,
}

#[derive(Debug, Deserialize)]
struct InstanceV3 {
    #[serde(default)]
    id: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl InstanceV3 {
    fn upgrade(self) -> InstanceObject {
        let mut attributes_flat = self.attributes;
        if !self.id.is_empty() {
            attributes_flat.entry("id".to_string()).or_insert(self.id);
        }
        InstanceObject {
            attributes: None,
            attributes_flat,
        }
    }
}

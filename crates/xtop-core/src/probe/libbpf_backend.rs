//! Concrete BPF-backed [`Probe`], gated behind the `sentinel` feature since
//! `libbpf-rs`/`libbpf-sys` metrics collection needs a BTF-enabled kernel
//! to attach against.
//!
//! Object files are expected to be built out-of-band (bpftool/clang) and
//! shipped alongside the daemon; this backend only opens, loads, and reads
//! them. No libbpf-cargo skeleton codegen is wired up here — that's a
//! build-script concern outside this crate's scope.

use libbpf_rs::{MapCore, ObjectBuilder};

use crate::errors::ProbeAttachError;

use super::{Probe, RawSample};

pub struct LibbpfProbe {
    name: &'static str,
    object_path: &'static str,
    map_name: &'static str,
    object: Option<libbpf_rs::Object>,
}

impl LibbpfProbe {
    pub fn new(name: &'static str, object_path: &'static str, map_name: &'static str) -> Self {
        Self { name, object_path, map_name, object: None }
    }
}

impl Probe for LibbpfProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn attach(&mut self) -> Result<(), ProbeAttachError> {
        let open = ObjectBuilder::default()
            .open_file(self.object_path)
            .map_err(|e| ProbeAttachError::Load(e.to_string()))?;
        let mut object = open.load().map_err(|e| match e.kind() {
            libbpf_rs::ErrorKind::PermissionDenied => ProbeAttachError::InsufficientPrivilege,
            _ => ProbeAttachError::Load(e.to_string()),
        })?;
        for prog in object.progs_mut() {
            prog.attach().map_err(|e| ProbeAttachError::Load(e.to_string()))?;
        }
        self.object = Some(object);
        Ok(())
    }

    fn read(&mut self) -> Vec<RawSample> {
        let Some(object) = self.object.as_ref() else {
            return Vec::new();
        };
        let Some(map) = object.maps().find(|m| m.name() == self.map_name) else {
            return Vec::new();
        };
        map.keys()
            .filter_map(|key| {
                let value = map.lookup(&key, libbpf_rs::MapFlags::ANY).ok().flatten()?;
                let value_u64 = u64::from_ne_bytes(value.get(..8)?.try_into().ok()?);
                Some(RawSample {
                    key: hex_key(&key),
                    value: value_u64 as f64,
                    tags: Default::default(),
                })
            })
            .collect()
    }

    fn close(&mut self) {
        self.object = None;
    }
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

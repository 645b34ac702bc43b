//! Encrypted project files
//!
//! A project file is one binary blob: the JSON document of [`ProjectFile`],
//! zero-padded to a 16-byte boundary and encrypted with AES-128-ECB under a
//! fixed embedded key. Decryption checks the literal JSON prefix of the
//! first block before parsing anything, so a wrong key (or a file that was
//! never a project) is reported as [`ProjectError::WrongKey`] instead of a
//! JSON error deep in the parser.
//!
//! Only raw entities are stored. Derived state - the registry, supers,
//! synthetic fields, cooked layouts - is rebuilt by re-running
//! [`finish_packages`](crate::resolve::finish_packages) on the loaded
//! packages, which reproduces it exactly.

use std::collections::HashMap;
use std::path::Path;

#[allow(deprecated)]
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use serde::{Deserialize, Serialize};

use crate::generate::TargetConfig;
use crate::model::Package;

/// Fixed project-file key; the encryption is an obfuscation layer, not a
/// secrecy boundary
const KEY: [u8; 16] = *b"udump secret key";

/// First bytes of every valid decrypted project document
const MAGIC: &[u8] = b"{\"settings\"";

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project file size {0} is not a multiple of 16 bytes")]
    InvalidSize(usize),

    #[error("wrong key")]
    WrongKey,

    #[error("malformed project JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything a project file persists
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Must stay the first field: the decrypt-time magic check depends on
    /// `{"settings"` being the first bytes of the document
    pub settings: TargetConfig,
    pub name_cache: HashMap<u64, String>,
    pub packages: Vec<Package>,
    /// Opaque editor view state, carried through verbatim
    #[serde(default)]
    pub view_state: serde_json::Value,
}

/// Serialize and encrypt a project into its on-disk bytes
pub fn encode(project: &ProjectFile) -> Result<Vec<u8>, ProjectError> {
    let mut data = serde_json::to_vec(project)?;
    let padding = (16 - data.len() % 16) % 16;
    data.extend(std::iter::repeat(0u8).take(padding));

    #[allow(deprecated)]
    let cipher = Aes128::new(GenericArray::from_slice(&KEY));
    for chunk in data.chunks_exact_mut(16) {
        #[allow(deprecated)]
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    Ok(data)
}

/// Decrypt and parse on-disk bytes into a project
pub fn decode(data: &[u8]) -> Result<ProjectFile, ProjectError> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(ProjectError::InvalidSize(data.len()));
    }

    #[allow(deprecated)]
    let cipher = Aes128::new(GenericArray::from_slice(&KEY));
    let mut decrypted = data.to_vec();
    for chunk in decrypted.chunks_exact_mut(16) {
        #[allow(deprecated)]
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }

    if !decrypted.starts_with(MAGIC) {
        return Err(ProjectError::WrongKey);
    }

    let end = decrypted
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    Ok(serde_json::from_slice(&decrypted[..end])?)
}

pub fn save_project(path: &Path, project: &ProjectFile) -> Result<(), ProjectError> {
    let data = encode(project)?;
    std::fs::write(path, data)?;
    Ok(())
}

pub fn load_project(path: &Path) -> Result<ProjectFile, ProjectError> {
    let data = std::fs::read(path)?;
    decode(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{ObjectArrayConfig, TargetConfig};
    use crate::model::{EnumWidth, TypeDescriptor, PropertyKind};
    use crate::names::NamePoolConfig;
    use crate::progress::Progress;
    use crate::resolve::finish_packages;
    use crate::testutil::{field, plain_struct};

    fn test_settings() -> TargetConfig {
        TargetConfig {
            name: "test".into(),
            root_object: "Object".into(),
            names: NamePoolConfig::chunked(0x1000),
            objects: ObjectArrayConfig {
                objects_address: 0x2000,
                count_address: 0x3000,
                stride: 8,
            },
            object_offsets: Default::default(),
            property_offsets: Default::default(),
            enum_offsets: Default::default(),
            function_offsets: Default::default(),
        }
    }

    fn test_project() -> ProjectFile {
        let mut core = Package::named("Core");
        let mut base = plain_struct("UBase", 0x30);
        base.is_class = true;
        core.classes.push(base);

        let mut game = Package::named("Game");
        let mut child = plain_struct("UChild", 0x40);
        child.is_class = true;
        child.inherited = true;
        child.super_names = vec!["UBase".into()];
        child.defined_fields.push(field("health", 0x28, 4));
        let mut nested = field("origin", 0x30, 0xC);
        nested.ty = TypeDescriptor::resolvable(PropertyKind::StructProperty, "FVector");
        child.defined_fields.push(nested);
        game.classes.push(child);

        let mut vec3 = plain_struct("FVector", 0xC);
        vec3.defined_fields.push(field("x", 0, 4));
        vec3.defined_fields.push(field("y", 4, 4));
        vec3.defined_fields.push(field("z", 8, 4));
        core.structs.push(vec3);

        let mut name_cache = HashMap::new();
        name_cache.insert(0u64, "None".to_string());
        name_cache.insert(42u64, "Actor".to_string());

        ProjectFile {
            settings: test_settings(),
            name_cache,
            packages: vec![core, game],
            view_state: serde_json::json!({ "selected": "UChild" }),
        }
    }

    #[test]
    fn test_encode_is_padded_and_opaque() {
        let project = test_project();
        let data = encode(&project).unwrap();
        assert_eq!(data.len() % 16, 0);
        assert!(!data.starts_with(MAGIC));
    }

    #[test]
    fn test_wrong_key_detected_before_parsing() {
        let project = test_project();
        let mut data = encode(&project).unwrap();
        // Corrupt the first block; decryption then yields garbage that must
        // be reported as a key problem, not a JSON error
        data[0] ^= 0xFF;
        assert!(matches!(decode(&data), Err(ProjectError::WrongKey)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let project = test_project();
        let data = encode(&project).unwrap();
        assert!(matches!(
            decode(&data[..data.len() - 5]),
            Err(ProjectError::InvalidSize(_))
        ));
        assert!(matches!(decode(&[]), Err(ProjectError::InvalidSize(0))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.udump");

        let project = test_project();
        save_project(&path, &project).unwrap();
        let loaded = load_project(&path).unwrap();

        assert_eq!(loaded.name_cache, project.name_cache);
        assert_eq!(loaded.packages.len(), 2);
        assert_eq!(loaded.view_state, project.view_state);
        assert_eq!(loaded.settings.name, "test");
    }

    #[test]
    fn test_reloaded_project_reproduces_layouts() {
        let project = test_project();

        let mut before = project.packages.clone();
        finish_packages(&mut before, &Progress::new()).unwrap();

        let data = encode(&project).unwrap();
        let mut after = decode(&data).unwrap().packages;
        finish_packages(&mut after, &Progress::new()).unwrap();

        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.dependencies, b.dependencies);
            for (sa, sb) in a
                .classes
                .iter()
                .chain(a.structs.iter())
                .zip(b.classes.iter().chain(b.structs.iter()))
            {
                assert_eq!(sa.max_size, sb.max_size);
                assert_eq!(sa.inherited_size, sb.inherited_size);
                assert_eq!(sa.synthetic_fields, sb.synthetic_fields);
                assert_eq!(sa.cooked, sb.cooked);
            }
        }
    }

    #[test]
    fn test_enum_storage_survives_round_trip() {
        let mut project = test_project();
        project.packages[0].enums.push(crate::model::EnumDef {
            full_name: "Core.EFlags".into(),
            short_name: "EFlags".into(),
            storage: EnumWidth::U32,
            members: vec![("A".into(), 0), ("B".into(), 70_000)],
            ..Default::default()
        });

        let loaded = decode(&encode(&project).unwrap()).unwrap();
        assert_eq!(loaded.packages[0].enums[0].storage, EnumWidth::U32);
        assert_eq!(loaded.packages[0].enums[0].members.len(), 2);
    }
}

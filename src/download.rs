//! Reading published snapshots back
//!
//! Gathers the artifacts of a release (optionally one study) from the object
//! store and nests them as `{release: {study: {entity: records}}}`. Both
//! artifact layouts are understood; a bundle archive is expanded in place.

use serde_json::{Map, Value};

use crate::archive;
use crate::clients::ObjectStore;
use crate::error::{Error, Result};
use crate::publisher::bundle_key;

/// Nest the published artifacts of `release_id` (or one of its studies)
///
/// Returns [`Error::NotFound`] when nothing was published for the selection.
pub async fn collect_release(
    objects: &dyn ObjectStore,
    release_id: &str,
    study_id: Option<&str>,
) -> Result<Value> {
    let mut studies: Map<String, Value> = Map::new();

    let prefix = match study_id {
        Some(study) => format!("{}/{}/", release_id, study),
        None => format!("{}/", release_id),
    };
    for key in objects.list(&prefix).await? {
        let Some((study, entity)) = split_entry(&key[release_id.len() + 1..]) else {
            continue;
        };
        let Some(bytes) = objects.get(&key).await? else {
            continue;
        };
        insert(&mut studies, study, entity, serde_json::from_slice(&bytes)?);
    }

    if let Some(bundle) = objects.get(&bundle_key(release_id)).await? {
        for (name, bytes) in archive::unpack(&bundle)? {
            let Some((study, entity)) = split_entry(&name) else {
                continue;
            };
            if study_id.is_some_and(|wanted| wanted != study) {
                continue;
            }
            insert(&mut studies, study, entity, serde_json::from_slice(&bytes)?);
        }
    }

    if studies.is_empty() {
        let what = match study_id {
            Some(study) => format!("snapshot for release {} study {}", release_id, study),
            None => format!("snapshot for release {}", release_id),
        };
        return Err(Error::NotFound(what));
    }

    tracing::debug!(release_id, study_id = ?study_id, studies = studies.len(), "collected release artifacts");

    let mut release = Map::new();
    release.insert(release_id.to_string(), Value::Object(studies));
    Ok(Value::Object(release))
}

/// Split `{study}/{entity}` (or a bundle's `{study}/{entity}.json`) into `(study, entity)`
fn split_entry(name: &str) -> Option<(&str, &str)> {
    let (study, file) = name.split_once('/')?;
    if study.is_empty() || file.is_empty() || file.contains('/') {
        return None;
    }
    let entity = file.strip_suffix(".json").unwrap_or(file);
    Some((study, entity))
}

fn insert(studies: &mut Map<String, Value>, study: &str, entity: &str, records: Value) {
    let entities = studies
        .entry(study.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(entities) = entities {
        entities.insert(entity.to_string(), records);
    }
}

//! Entity stub pages.
//!
//! One short markdown page per entity under `refs/<kind>/<slug>.md`,
//! acting as a backlink hub. Stubs are created-if-absent (CAS via
//! `create_new`) and never rewritten on re-ingestion; the membership list
//! is an implicit Dataview query rendered by the vault viewer.

use super::slug::slugify;
use crate::enrich::{DateRef, EntityRef};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stub page location for an entity, relative to the vault root.
pub fn stub_relative_path(entity: &EntityRef) -> PathBuf {
    PathBuf::from("refs")
        .join(entity.kind.stub_dir())
        .join(format!("{}.md", slugify(entity.display_label(), 60)))
}

/// Stub page location for a resolved date mention.
pub fn date_stub_relative_path(iso: &str) -> PathBuf {
    PathBuf::from("refs").join("dates").join(format!("{iso}.md"))
}

fn write_if_absent(path: &Path, content: &str) -> std::io::Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            file.write_all(content.as_bytes())?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

fn stub_content(kind: &str, name: &str, aliases: &[String]) -> String {
    let alias_list = if aliases.is_empty() {
        "[]".to_string()
    } else {
        format!(
            "[{}]",
            aliases
                .iter()
                .map(|a| format!("\"{a}\""))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    format!(
        "---\ntype: {kind}\nname: \"{name}\"\naliases: {alias_list}\n---\n\n\
         # {name}\n\n\
         ```dataview\nLIST FROM \"\" WHERE contains(file.outlinks, this.file.link)\n```\n"
    )
}

/// Create the stub for an entity if it does not exist yet.
///
/// Returns whether a new stub was written.
pub fn ensure_entity_stub(vault_root: &Path, entity: &EntityRef) -> std::io::Result<bool> {
    let path = vault_root.join(stub_relative_path(entity));
    let kind = match entity.kind {
        crate::enrich::EntityKind::Person => "person",
        crate::enrich::EntityKind::Organization => "organization",
        crate::enrich::EntityKind::Technology => "technology",
        crate::enrich::EntityKind::Event => "event",
        crate::enrich::EntityKind::Concept => "concept",
    };
    // Alt spellings: surface form differing from the canonical label.
    let aliases: Vec<String> = if entity
        .pref_label
        .as_deref()
        .map(|p| p != entity.label)
        .unwrap_or(false)
    {
        vec![entity.label.clone()]
    } else {
        Vec::new()
    };
    let created = write_if_absent(&path, &stub_content(kind, entity.display_label(), &aliases))?;
    if created {
        debug!(path = %path.display(), "entity stub created");
    }
    Ok(created)
}

/// Create the stub for a resolved date mention if absent.
pub fn ensure_date_stub(vault_root: &Path, date: &DateRef) -> std::io::Result<bool> {
    let Some(iso) = &date.iso else {
        return Ok(false);
    };
    let path = vault_root.join(date_stub_relative_path(iso));
    write_if_absent(&path, &stub_content("date", iso, &[]))
}

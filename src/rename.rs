//! Chromosome renaming (spec §6 `rename-chromosomes`, SPEC_FULL.md
//! "Supplemented features"): rewrites a container's `Reference` in
//! place, revalidating uniqueness and non-emptiness before committing —
//! built on `Reference::renamed`, which already performs that
//! revalidation by routing through `Reference::new`.

use std::collections::HashMap;
use std::path::Path;

use log::info;

use crate::error::{HictkError, Result};
use crate::reference::Reference;

/// How to rewrite chromosome names (spec §6's three mutually exclusive
/// forms).
pub enum RenameRule<'a> {
    AddChrPrefix,
    RemoveChrPrefix,
    NameMapping(&'a HashMap<String, String>),
}

/// Computes the renamed `Reference`; does not touch the container on
/// disk (the caller rewrites the `chroms` dataset/header with the
/// writer once this succeeds, so a parse/uniqueness failure never
/// touches the original file).
pub fn rename(reference: &Reference, rule: &RenameRule) -> Result<Reference> {
    let renamed = match rule {
        RenameRule::AddChrPrefix => reference.renamed(|name| {
            if name.starts_with("chr") {
                name.to_string()
            } else {
                format!("chr{name}")
            }
        })?,
        RenameRule::RemoveChrPrefix => reference.renamed(|name| name.strip_prefix("chr").unwrap_or(name).to_string())?,
        RenameRule::NameMapping(mapping) => {
            for name in reference.names() {
                if !mapping.contains_key(name) {
                    return Err(HictkError::UnknownChromosome { name: name.clone() });
                }
            }
            reference.renamed(|name| mapping.get(name).cloned().unwrap_or_else(|| name.to_string()))?
        }
    };
    info!("renamed {} chromosomes", reference.len());
    Ok(renamed)
}

/// Parses a two-column `old<TAB>new` mapping file (spec §6
/// `--name-mappings F`).
pub fn parse_name_mappings(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)?;
    let mut mapping = HashMap::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line.split('\t');
        let (old, new) = match (cols.next(), cols.next()) {
            (Some(o), Some(n)) => (o, n),
            _ => {
                return Err(HictkError::BadIngestRecord {
                    line: line_no + 1,
                    reason: "expected two tab-separated columns".into(),
                })
            }
        };
        mapping.insert(old.to_string(), new.to_string());
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Reference {
        Reference::new(vec!["1".into(), "2".into(), "chrX".into()], vec![100, 200, 50]).unwrap()
    }

    #[test]
    fn add_chr_prefix_is_idempotent_on_already_prefixed_names() {
        let renamed = rename(&reference(), &RenameRule::AddChrPrefix).unwrap();
        assert_eq!(renamed.names(), &["chr1".to_string(), "chr2".to_string(), "chrX".to_string()]);
    }

    #[test]
    fn remove_chr_prefix_only_strips_present_prefix() {
        let renamed = rename(&reference(), &RenameRule::RemoveChrPrefix).unwrap();
        assert_eq!(renamed.names(), &["1".to_string(), "2".to_string(), "X".to_string()]);
    }

    #[test]
    fn name_mapping_requires_full_coverage() {
        let mut mapping = HashMap::new();
        mapping.insert("1".to_string(), "chr1".to_string());
        let err = rename(&reference(), &RenameRule::NameMapping(&mapping));
        assert!(err.is_err());
    }
}

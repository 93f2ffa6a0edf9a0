use std::path::{Path, PathBuf};

/// `path[::/group/subgroup]` addressing; selects a resolution or cell
/// within a multi-resolution or single-cell container (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub path: PathBuf,
    pub group: Option<String>,
}

impl Uri {
    pub fn parse(s: &str) -> Uri {
        match s.split_once("::") {
            Some((path, group)) => Uri { path: PathBuf::from(path), group: Some(group.to_string()) },
            None => Uri { path: PathBuf::from(s), group: None },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.group {
            Some(g) => write!(f, "{}::{}", self.path.display(), g),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Uri {
        Uri::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_path() {
        let uri = Uri::parse("in.cool");
        assert_eq!(uri.path(), Path::new("in.cool"));
        assert_eq!(uri.group, None);
    }

    #[test]
    fn parses_path_with_group() {
        let uri = Uri::parse("in.mcool::/resolutions/10000");
        assert_eq!(uri.path(), Path::new("in.mcool"));
        assert_eq!(uri.group.as_deref(), Some("/resolutions/10000"));
    }

    #[test]
    fn display_round_trips() {
        let uri = Uri::parse("in.scool::/cells/GM12878");
        assert_eq!(uri.to_string(), "in.scool::/cells/GM12878");
        assert_eq!(Uri::parse("in.cool").to_string(), "in.cool");
    }
}

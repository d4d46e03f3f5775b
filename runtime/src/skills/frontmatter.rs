//! `SKILL.md` frontmatter parsing: a leading `---`-delimited YAML block with
//! `name` and `description` (§4.6).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Frontmatter {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("no frontmatter block found")]
    Missing,
    #[error("invalid frontmatter yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Splits `content` into `(frontmatter, body)`, parsing the YAML header.
pub fn parse_frontmatter(content: &str) -> Result<Frontmatter, FrontmatterError> {
    let rest = content.strip_prefix("---").ok_or(FrontmatterError::Missing)?;
    let end = rest.find("\n---").ok_or(FrontmatterError::Missing)?;
    let yaml = &rest[..end];
    Ok(serde_yaml::from_str(yaml)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_description() {
        let content = "---\nname: deploy-checklist\ndescription: Pre-deploy checks\n---\nBody text here.\n";
        let fm = parse_frontmatter(content).unwrap();
        assert_eq!(fm.name, "deploy-checklist");
        assert_eq!(fm.description, "Pre-deploy checks");
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        assert!(parse_frontmatter("just some text").is_err());
    }

    #[test]
    fn description_defaults_to_empty_when_absent() {
        let content = "---\nname: foo\n---\nbody\n";
        let fm = parse_frontmatter(content).unwrap();
        assert_eq!(fm.description, "");
    }
}

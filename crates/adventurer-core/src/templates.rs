use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AdventurerError, Result};

/// Marker in the adventurer template replaced by the generated description.
pub const DESCRIPTION_MARKER: &str = "$description";
/// Marker in the adventurer template replaced by the generated attributes.
pub const ATTRIBUTES_MARKER: &str = "$attributes";

/// Text templates loaded once at startup and handed to the components that
/// need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    /// Persona preprompt containing the description/attributes markers.
    pub adventurer: String,
    /// Bootstrap prompt asking the backend for character attributes.
    pub attributes: String,
    /// Bootstrap prompt asking the backend for a character description.
    pub description: String,
    /// Preprompt the HuggingChat session uses until a persona is applied.
    pub backend_default: String,
}

impl PromptTemplates {
    /// Load `adventurer/{adventurer,attributes,description}.txt` and
    /// `huggingchat/default.txt` from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let persona = dir.join("adventurer");
        Ok(Self {
            adventurer: read_template(&persona, "adventurer")?,
            attributes: read_template(&persona, "attributes")?,
            description: read_template(&persona, "description")?,
            backend_default: read_template(&dir.join("huggingchat"), "default")?,
        })
    }

    /// Substitute the generated persona fields into the adventurer template.
    /// Values are inserted verbatim.
    pub fn render_persona(&self, description: &str, attributes: &str) -> String {
        let markers = [(DESCRIPTION_MARKER, description), (ATTRIBUTES_MARKER, attributes)];
        let mut out = String::with_capacity(
            self.adventurer.len() + description.len() + attributes.len(),
        );
        let mut rest = self.adventurer.as_str();

        // one left-to-right pass, so inserted text is never scanned again
        while let Some((at, marker, value)) = markers
            .iter()
            .filter_map(|&(marker, value)| rest.find(marker).map(|at| (at, marker, value)))
            .min_by_key(|&(at, _, _)| at)
        {
            out.push_str(&rest[..at]);
            out.push_str(value);
            rest = &rest[at + marker.len()..];
        }
        out.push_str(rest);
        out
    }
}

fn read_template(folder: &Path, name: &str) -> Result<String> {
    let path: PathBuf = folder.join(format!("{name}.txt"));
    debug!(path = %path.display(), "loading template");
    std::fs::read_to_string(&path).map_err(|e| AdventurerError::Template {
        name: name.to_string(),
        reason: format!("{}: {e}", path.display()),
    })
}

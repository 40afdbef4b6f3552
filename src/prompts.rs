//! Prompt vocabulary and the analysis instruction block.
//!
//! Keeping the prompt here means unit tests can inspect it directly without
//! a model round-trip. The material-type catalog is only used as prompt
//! vocabulary; the model's free-text answer is never parsed back into a
//! [`MaterialType`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Archival material categories offered to the model, in prompt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    Monograph,
    ExhibitionCatalog,
    Inventory,
    Diary,
    HistoricalPhotograph,
    PhotoIndexCard,
    Other,
}

impl MaterialType {
    /// The full catalog, in the order it is enumerated in the prompt.
    pub const ALL: [MaterialType; 7] = [
        MaterialType::Monograph,
        MaterialType::ExhibitionCatalog,
        MaterialType::Inventory,
        MaterialType::Diary,
        MaterialType::HistoricalPhotograph,
        MaterialType::PhotoIndexCard,
        MaterialType::Other,
    ];

    /// Label as it appears in the prompt.
    pub fn label(self) -> &'static str {
        match self {
            MaterialType::Monograph => "Monographs/Journals",
            MaterialType::ExhibitionCatalog => "Exhibition/Museum catalogs",
            MaterialType::Inventory => "Inventories or lists",
            MaterialType::Diary => "Diaries",
            MaterialType::HistoricalPhotograph => "Historical Photographs",
            MaterialType::PhotoIndexCard => "Photograph catalog index cards",
            MaterialType::Other => "Other Archival material",
        }
    }

    /// Catalog labels as owned strings, for [`crate::AnalysisConfig::material_types`].
    pub fn catalog_labels() -> Vec<String> {
        Self::ALL.iter().map(|t| t.label().to_string()).collect()
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const PROMPT_PREAMBLE: &str = "Analyze these document images and describe the material in detail. \
Consider the following potential types:\n\n";

const PROMPT_QUESTIONS: &str = "\nPlease provide the following information:\n\
1. Language of the document\n\
2. Time period/era\n\
3. Type of material (from the list above or other if applicable)\n\
4. Whether it's handwritten, printed, or both\n\
5. Format and layout description\n\
6. Sequencing information (page numbers, etc.)\n\
7. Dependencies on previous or other pages\n\
8. Potential challenges for transcription (what to be careful with)\n\n\
Provide a comprehensive analysis based on the sample images.";

/// Render the instruction block sent as the text part of the request.
///
/// Every material type is listed as a `- ` bullet in the order given,
/// followed by the eight fixed analysis questions. The output depends only
/// on `material_types`.
pub fn build_prompt<S: AsRef<str>>(material_types: &[S]) -> String {
    let mut prompt = String::from(PROMPT_PREAMBLE);
    for material_type in material_types {
        prompt.push_str("- ");
        prompt.push_str(material_type.as_ref());
        prompt.push('\n');
    }
    prompt.push_str(PROMPT_QUESTIONS);
    prompt
}

//! Prompt construction for page translation.
//!
//! Every prompt fragment lives here so prompt changes touch exactly one file
//! and tests can inspect the final request string without a model.
//!
//! A request carries, in order: the role instruction, the continuity block
//! (tails of the previous page's source and translation), the current page
//! wrapped in [`START_MARKER`]/[`END_MARKER`], and the output rules. The
//! markers are also on the sanitizer's strip list in case the model echoes
//! them back.

/// Opens the page text inside the prompt.
pub const START_MARKER: &str = "[START]";

/// Closes the page text inside the prompt.
pub const END_MARKER: &str = "[END]";

/// Default number of trailing characters of the previous page sent as context.
pub const DEFAULT_CONTEXT_WINDOW: usize = 350;

const CONTINUITY_HEADER: &str = "CONTEXT FROM THE PREVIOUS PAGE (do not translate it again):";

const CONTINUITY_FOOTER: &str = "If the current page starts in the middle of a sentence, continue that sentence naturally.
Do not repeat the previous translation and do not restart its sentence.";

const OUTPUT_RULES: &str = r#"RULES:
1. Output ONLY the translation of the text between the markers.
2. Never repeat these instructions or any of the markers.
3. Never include the original text in your reply.
4. Do not add comments, notes, titles or explanations.
5. Keep paragraph breaks, list structure and numbering of the original."#;

/// Everything the builder needs to know about one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageContext<'a> {
    /// 0-based index of the page being translated.
    pub page_index: usize,
    /// Full extracted text of the page.
    pub source_text: &'a str,
    /// Trailing window of the previous page's source text.
    pub prior_source_tail: &'a str,
    /// Trailing window of the previous page's translation.
    pub prior_translation_tail: &'a str,
}

/// Builds translation requests with a fixed role, language and glossary.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    target_language: String,
    domain: String,
    glossary: Vec<(String, String)>,
}

impl PromptBuilder {
    pub fn new(target_language: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
            domain: domain.into(),
            glossary: Vec::new(),
        }
    }

    /// Fixed term substitutions the model must apply, in order.
    pub fn with_glossary(mut self, glossary: Vec<(String, String)>) -> Self {
        self.glossary = glossary;
        self
    }

    /// Render the full request string for one page.
    ///
    /// Page 0 never carries continuity hints, whatever the caller passes.
    pub fn build(&self, page: &PageContext<'_>) -> String {
        let mut sections = Vec::with_capacity(5);

        // Values go in through format arguments only: page text may itself
        // contain braces or placeholder-like words.
        sections.push(format!(
            "You are a professional translator specialised in {domain} documents. \
             Translate the page below into {language}.",
            domain = self.domain,
            language = self.target_language,
        ));

        if page.page_index > 0
            && (!page.prior_source_tail.is_empty() || !page.prior_translation_tail.is_empty())
        {
            sections.push(format!(
                "{CONTINUITY_HEADER}\n\
                 The previous page ended with this original text:\n\
                 \"\"\"{source}\"\"\"\n\
                 and its translation ended with:\n\
                 \"\"\"{translation}\"\"\"\n\
                 {CONTINUITY_FOOTER}",
                source = page.prior_source_tail,
                translation = page.prior_translation_tail,
            ));
        }

        sections.push(format!(
            "PAGE {} TO TRANSLATE:\n{START_MARKER}\n{}\n{END_MARKER}",
            page.page_index + 1,
            page.source_text.trim()
        ));

        let mut rules = OUTPUT_RULES.to_string();
        rules.push_str(&format!(
            "\n6. Write the whole reply in {}.",
            self.target_language
        ));
        sections.push(rules);

        if !self.glossary.is_empty() {
            let terms: Vec<String> = self
                .glossary
                .iter()
                .map(|(from, to)| format!("- always translate \"{from}\" as \"{to}\""))
                .collect();
            sections.push(format!("TERMINOLOGY:\n{}", terms.join("\n")));
        }

        sections.join("\n\n")
    }
}

/// The last `window` characters of `text`, cut on a char boundary.
pub fn tail(text: &str, window: usize) -> &str {
    let char_count = text.chars().count();
    if char_count <= window {
        return text;
    }
    let skip = char_count - window;
    match text.char_indices().nth(skip) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => "",
    }
}

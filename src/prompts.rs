//! Prompts sent to the remote model.
//!
//! Every piece of prompt text lives here so that wording changes never touch
//! the session or pipeline code, and so unit tests can inspect prompts
//! without a model.
//!
//! Callers can override the tutor instruction via
//! [`crate::config::TutorConfig::system_prompt`]; the constants here are used
//! only when no override is provided.

/// Default system instruction for a document conversation.
pub const TUTOR_SYSTEM_PROMPT: &str = "You are an expert tutor. Answer based strictly on the provided file. If you mention a diagram, end with [[PAGE_REF: page_number]].";

/// First user turn of every session, sent together with the document.
pub const SEED_USER_MESSAGE: &str = "Analyze this document.";

/// Canned model reply that closes the seed exchange.
pub const SEED_MODEL_REPLY: &str = "Ready.";

/// Words that make a question ask for a page citation.
pub const DIAGRAM_KEYWORDS: [&str; 4] = ["diagram", "image", "figure", "flowchart"];

/// Suffix appended to questions that mention one of [`DIAGRAM_KEYWORDS`].
pub const PAGE_REF_INSTRUCTION: &str =
    " LOCATE any relevant diagrams and cite the Page Number using [[PAGE_REF: X]].";

/// Single-turn prompt sent alongside a rendered page image.
pub const BOUNDING_BOX_PROMPT: &str = r#"
Analyze this image page. Your task is to find the main diagram, flowchart, or chart.
Goal: Provide a tight bounding box around ONLY the graphical elements.
CRITICAL: Exclude any surrounding paragraph text, headers, footers, or page numbers.
Return the coordinates strictly as a JSON list of normalized integers (0-1000 scale): [ymin, xmin, ymax, xmax].
If no clear diagram, return [].
"#;

/// Build the chat prompt for a user question.
///
/// `length` is the answer length the user picked in the UI (e.g. "short",
/// "medium", "detailed").
pub fn question_prompt(question: &str, length: &str) -> String {
    let suffix = if wants_page_reference(question) {
        PAGE_REF_INSTRUCTION
    } else {
        ""
    };
    format!("{question} (Length: {length}){suffix}")
}

/// True when the question mentions a diagram-like keyword (case-insensitive).
pub fn wants_page_reference(question: &str) -> bool {
    let lower = question.to_lowercase();
    DIAGRAM_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// JSON shape the model must follow for a given quiz type.
pub fn quiz_structure(quiz_type: &str) -> &'static str {
    match quiz_type {
        "multiple_choice" => {
            r#"[{ "question": "...", "options": ["A", "B", "C", "D"], "answer": "Option Text" }]"#
        }
        "true_false" => {
            r#"[{ "question": "...", "options": ["True", "False"], "answer": "True" }]"#
        }
        // short_answer, fill_in_the_blank, and anything unrecognised
        _ => r#"[{ "question": "...", "answer": "The Answer" }]"#,
    }
}

/// Build the quiz-generation prompt.
pub fn quiz_prompt(count: u32, topic: &str, difficulty: &str, quiz_type: &str) -> String {
    format!(
        "\nGenerate {count} {difficulty} questions about '{topic}' based on the document.\n\
         Question Type: {quiz_type}.\n\
         Format strictly as a JSON array. Do not use Markdown.\n\
         Structure: {structure}\n",
        structure = quiz_structure(quiz_type)
    )
}

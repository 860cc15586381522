//! Extraction instructions sent alongside the file.
//!
//! Both variants share one output contract: only the extracted text, no
//! commentary, and embedded images described in prose. The PDF variant is
//! used by [`crate::Extractor::extract_from_pdf`]; everything else gets the
//! generic variant.

/// Generic instruction. `{file_name}` is substituted before sending.
pub const GENERIC_INSTRUCTION: &str = r#"Extract ALL of the text from this file ({file_name}) and return ONLY the extracted text, with no comments or additional explanations.
If the file contains images, describe the content of the images as well.
If it is a document (PDF, DOCX), extract all of the text it contains.

Return only the plain text extracted from the document."#;

/// PDF-specific instruction. `{file_name}` is substituted before sending.
pub const PDF_INSTRUCTION: &str = r#"Extract ALL of the text from this PDF ({file_name}) and return ONLY the extracted text, with no comments or additional explanations.
If the PDF contains scanned images, describe the content of the images as well.

Return only the plain text extracted from the document."#;

/// Render the generic instruction for `file_name`.
pub fn generic_instruction(file_name: &str) -> String {
    GENERIC_INSTRUCTION.replace("{file_name}", file_name)
}

/// Render the PDF instruction for `file_name`.
pub fn pdf_instruction(file_name: &str) -> String {
    PDF_INSTRUCTION.replace("{file_name}", file_name)
}

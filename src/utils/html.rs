use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Question explanations are authored by staff as rich text and rendered
/// back to students after a result is published. Whitelist-based
/// sanitization keeps safe formatting tags (<b>, <p>, lists) while
/// stripping <script>, <iframe> and event-handler attributes, so a
/// compromised staff account cannot plant stored XSS in result reviews.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

// src/utils/html.rs

/// Sanitizes author-supplied exam text (titles, questions, options, explanations).
///
/// Safe formatting tags such as <b> or <code> survive; <script>, <iframe> and
/// event-handler attributes are stripped, including the script body.
/// Answer keys are not sanitized: they are compared verbatim against what the
/// student sends back and are never rendered.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

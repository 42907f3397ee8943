//! Message parser - Splits raw message content into command tokens

/// Split on whitespace, dropping the empty tokens runs of separators leave behind
pub fn tokenize(content: &str) -> Vec<String> {
    content.split_whitespace().map(str::to_string).collect()
}

/// Render a token line for the audit log, e.g. `[!roll 2 d6]`
pub fn render_line(args: &[String]) -> String {
    format!("[{}]", args.join(" "))
}

//! Turns raw source text into one token list per physical line.
//!
//! A `#` token ends the line (it and everything after it is a comment),
//! commas are stripped from every token, and tokens that become empty are
//! dropped. Blank and comment-only lines keep an empty slot so that line
//! numbering stays 1-based across both passes.

/// Tokenize the whole source, one entry per physical line.
pub fn tokenize_source(source: &str) -> Vec<Vec<String>> {
  source.lines().map(tokenize_line).collect()
}

fn tokenize_line(line: &str) -> Vec<String> {
  let mut tokens = Vec::new();

  for raw in line.split_whitespace() {
    if raw == "#" {
      break;
    }

    let token: String = raw.chars().filter(|&c| c != ',').collect();
    if !token.is_empty() {
      tokens.push(token);
    }
  }

  tokens
}

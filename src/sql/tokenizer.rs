/// Splits one script line into tokens.
///
/// Tokens are separated by spaces, commas and semicolons, except inside a
/// parenthesized group or a single-quoted string:
///
/// - a token that *starts* with `(` runs to its matching `)` and is emitted
///   without the outer parentheses (`(id INT, name STRING(10))` becomes
///   `id INT, name STRING(10)`)
/// - a quoted string keeps its quotes and any commas or spaces inside it
/// - parentheses inside a word (`STRING(10)`) are kept and nest normally
///
/// Nesting depth and the quote state are plain counters; nothing recurses.
/// Empty runs produce no token.
pub fn tokenize(line: &str) -> Tokens {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut group = false;

    for c in line.chars() {
        if in_quote {
            current.push(c);
            if c == '\'' {
                in_quote = false;
            }
            continue;
        }
        if c == '\'' {
            in_quote = true;
            current.push(c);
            continue;
        }
        if depth > 0 {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth == 0 && group {
                group = false;
                flush(&mut current, &mut tokens);
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            ' ' | ',' | ';' | '\t' | '\r' | '\n' => flush(&mut current, &mut tokens),
            '(' => {
                depth = 1;
                if current.is_empty() {
                    group = true;
                } else {
                    current.push(c);
                }
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);

    Tokens { tokens, cursor: 0 }
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// An owned token sequence consumed front to back through a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    tokens: Vec<String>,
    cursor: usize,
}

impl Tokens {
    /// Pops the next token.
    pub fn pop(&mut self) -> Option<&str> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(token.as_str())
    }

    pub fn peek(&self) -> Option<&str> {
        self.tokens.get(self.cursor).map(String::as_str)
    }

    /// Consumes the next token if it is `keyword` (case-insensitive).
    pub fn eat(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(token) if token.eq_ignore_ascii_case(keyword) => {
                self.cursor += 1;
                true
            }
            _ => false,
        }
    }

    /// Consumes tokens up to (not including) `keyword` or the end.
    pub fn take_until(&mut self, keyword: &str) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(token) = self.peek() {
            if token.eq_ignore_ascii_case(keyword) {
                break;
            }
            out.push(token.to_string());
            self.cursor += 1;
        }
        out
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    pub fn remaining(&self) -> &[String] {
        &self.tokens[self.cursor.min(self.tokens.len())..]
    }
}

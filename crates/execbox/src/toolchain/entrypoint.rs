//! Entry type discovery for JVM sources

use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;

static TYPE_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:(?:public|abstract|final|static|sealed|non-sealed|strictfp)\s+)*)(?:class|interface|enum|record)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .expect("type declaration regex is valid")
});

/// Find the name of the type a JVM source file declares
///
/// Only top-level declarations count, and a `public` one wins over earlier
/// non-public ones. Comments, string and character literals, and text
/// blocks are ignored.
pub fn extract_type_name(source: &str) -> Option<String> {
    let masked = mask_comments_and_literals(source);
    let mut first = None;
    let mut depth = 0usize;
    let mut scanned = 0;
    for caps in TYPE_DECLARATION.captures_iter(&masked) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        depth = brace_depth(&masked[scanned..whole.start()], depth);
        scanned = whole.start();
        if depth > 0 {
            continue;
        }
        let name = name.as_str();
        let modifiers = caps.get(1).map_or("", |m| m.as_str());
        if modifiers.split_whitespace().any(|m| m == "public") {
            return Some(name.to_owned());
        }
        first.get_or_insert_with(|| name.to_owned());
    }
    first
}

fn brace_depth(text: &str, depth: usize) -> usize {
    text.chars().fold(depth, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth.saturating_sub(1),
        _ => depth,
    })
}

/// Wrap bare statements in a public type with a `main` method
///
/// Leading `import` lines are hoisted above the type declaration.
pub fn wrap_in_entry_type(type_name: &str, body: &str) -> String {
    let (imports, statements): (Vec<&str>, Vec<&str>) = body.lines().partition(|line| {
        let line = line.trim();
        line.starts_with("import ") && line.ends_with(';')
    });

    let mut wrapped = String::with_capacity(body.len() + 96);
    for line in imports {
        wrapped.push_str(line.trim());
        wrapped.push('\n');
    }
    wrapped.push_str(&format!(
        "public class {type_name} {{\npublic static void main(String[] args) {{\n"
    ));
    for line in statements {
        wrapped.push_str(line);
        wrapped.push('\n');
    }
    wrapped.push_str("}\n}\n");
    wrapped
}

/// Blank out comments and literal contents, keeping line breaks in place
fn mask_comments_and_literals(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    if c == '\n' {
                        out.push('\n');
                    }
                    prev = c;
                }
                out.push(' ');
            }
            '"' if starts_text_block(&chars) => {
                chars.next();
                chars.next();
                out.push(' ');
                let mut quotes = 0;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            quotes += 1;
                            if quotes == 3 {
                                break;
                            }
                            continue;
                        }
                        '\\' => {
                            if chars.next() == Some('\n') {
                                out.push('\n');
                            }
                        }
                        '\n' => out.push('\n'),
                        _ => {}
                    }
                    quotes = 0;
                }
                out.push(' ');
            }
            '"' | '\'' => {
                let quote = c;
                out.push(' ');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if chars.next() == Some('\n') {
                                out.push('\n');
                                break;
                            }
                        }
                        '\n' => {
                            out.push('\n');
                            break;
                        }
                        c if c == quote => break,
                        _ => {}
                    }
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Whether the two characters after an opening quote complete a `"""`
fn starts_text_block(chars: &Peekable<Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next() == Some('"') && ahead.next() == Some('"')
}

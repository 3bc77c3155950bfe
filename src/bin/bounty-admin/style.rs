//! Terminal styling utilities

use colored::Colorize;

pub fn style_cyan(s: &str) -> String {
    s.cyan().to_string()
}

pub fn style_green(s: &str) -> String {
    s.green().to_string()
}

pub fn style_red(s: &str) -> String {
    s.red().to_string()
}

pub fn style_yellow(s: &str) -> String {
    s.yellow().to_string()
}

pub fn style_dim(s: &str) -> String {
    s.dimmed().to_string()
}

pub fn style_bold(s: &str) -> String {
    s.bold().to_string()
}

pub fn print_success(msg: &str) {
    println!("{} {}", style_green("✓"), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", style_red("✗"), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", style_yellow("⚠"), msg);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", style_bold(title));
    println!("{}", "─".repeat(title.chars().count()));
}

/// Shorten a pubkey for tables: first 8 and last 4 characters.
pub fn truncate_pubkey(pubkey: &str) -> String {
    let chars: Vec<char> = pubkey.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        pubkey.to_string()
    }
}

/// Render a smallest-unit amount with thousands separators.
pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

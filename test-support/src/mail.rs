use regex::Regex;

/// The unfolded value of the first header called `name` in a raw message, matched
/// case-insensitively.
pub fn header_value(mail: &str, name: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r"(?mi)^{}:[ \t]*(.*(?:\r?\n[ \t]+.*)*)",
        regex::escape(name)
    ))
    .unwrap();
    pattern.captures(mail).map(|captures| {
        captures[1]
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    })
}

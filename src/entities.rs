/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub mod predefined {
    pub const LT: &str = "&lt;";
    pub const GT: &str = "&gt;";
    pub const AMP: &str = "&amp;";
    pub const APOS: &str = "&apos;";
    pub const QUOT: &str = "&quot;";
}

fn replacement(c: u8) -> Option<&'static str> {
    match c {
        b'<' => Some(predefined::LT),
        b'>' => Some(predefined::GT),
        b'&' => Some(predefined::AMP),
        b'\'' => Some(predefined::APOS),
        b'"' => Some(predefined::QUOT),
        _ => None,
    }
}

/// Length of the string after escaping the XML special characters.
pub fn escaped_size(s: &str) -> usize {
    s.bytes()
        .map(|c| replacement(c).map_or(1, str::len))
        .sum()
}

/// Writes the string with the XML special characters escaped.
///
/// Unescaped runs are written as a single slice.
pub fn escape_fmt(s: &str, f: &mut impl std::fmt::Write) -> std::fmt::Result {
    let mut start = 0;
    for (pos, c) in s.bytes().enumerate() {
        if let Some(entity) = replacement(c) {
            f.write_str(&s[start..pos])?;
            f.write_str(entity)?;
            start = pos + 1;
        }
    }
    f.write_str(&s[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_size() {
        const NOESCAPE: &str = "abc$#@!%^*(){}[]=-+/.,;:FDSF3443";
        assert_eq!(escaped_size(NOESCAPE), NOESCAPE.len());
        assert_eq!(escaped_size("abc&def"), "abc&amp;def".len());
        assert_eq!(escaped_size("<>&'\""), "&lt;&gt;&amp;&apos;&quot;".len());
    }

    #[test]
    fn escape() {
        let mut out = String::new();
        escape_fmt("a<b>'c'&\"d\" \u{e7}", &mut out).unwrap();
        assert_eq!(out, "a&lt;b&gt;&apos;c&apos;&amp;&quot;d&quot; \u{e7}");
        assert_eq!(out.len(), escaped_size("a<b>'c'&\"d\" \u{e7}"));
    }
}

//! Body personalization
//!
//! Substitutes `[first]`, `[name]`, `[phone]`, `[email]` and `[campaign]`
//! (and the curly-brace variants) case-insensitively, then trims the result.
//! Unknown tokens pass through untouched; missing values substitute empty.

/// Values available to a template
#[derive(Debug, Default, Clone)]
pub struct TemplateVars {
    pub first: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub campaign: Option<String>,
}

impl TemplateVars {
    fn lookup(&self, token: &str) -> Option<&str> {
        let value = match token {
            "first" => &self.first,
            "name" => &self.name,
            "phone" => &self.phone,
            "email" => &self.email,
            "campaign" => &self.campaign,
            _ => return None,
        };
        Some(value.as_deref().unwrap_or(""))
    }
}

/// Apply variable substitution to a message body
pub fn personalize(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let open = chars[i];
        let close = match open {
            '[' => ']',
            '{' => '}',
            _ => {
                out.push(open);
                i += 1;
                continue;
            }
        };

        match chars[i + 1..].iter().position(|&c| c == close) {
            Some(offset) => {
                let token: String = chars[i + 1..i + 1 + offset].iter().collect();
                match vars.lookup(&token.trim().to_lowercase()) {
                    Some(value) => {
                        out.push_str(value);
                        i += offset + 2;
                    }
                    None => {
                        out.push(open);
                        i += 1;
                    }
                }
            }
            None => {
                out.push(open);
                i += 1;
            }
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> TemplateVars {
        TemplateVars {
            first: Some("Ada".to_string()),
            name: Some("Ada Lovelace".to_string()),
            phone: Some("+15551112222".to_string()),
            email: Some("ada@example.com".to_string()),
            campaign: Some("Launch".to_string()),
        }
    }

    #[test]
    fn test_square_bracket_tokens() {
        assert_eq!(personalize("hi [first]", &ada()), "hi Ada");
        assert_eq!(
            personalize("[name] <[email]>", &ada()),
            "Ada Lovelace <ada@example.com>"
        );
    }

    #[test]
    fn test_curly_brace_variants() {
        assert_eq!(personalize("hi {first} from {campaign}", &ada()), "hi Ada from Launch");
    }

    #[test]
    fn test_case_insensitive_tokens() {
        assert_eq!(personalize("hi [FIRST] / {First}", &ada()), "hi Ada / Ada");
    }

    #[test]
    fn test_missing_values_substitute_empty_and_trim() {
        let vars = TemplateVars::default();
        assert_eq!(personalize("[first] welcome", &vars), "welcome");
    }

    #[test]
    fn test_unknown_tokens_pass_through() {
        assert_eq!(personalize("use [code] now", &ada()), "use [code] now");
        assert_eq!(personalize("set {x}", &ada()), "set {x}");
    }

    #[test]
    fn test_unclosed_brackets_left_alone() {
        assert_eq!(personalize("hi [first", &ada()), "hi [first");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(personalize("  plain body  ", &ada()), "plain body");
    }
}

//! Escaping and template rendering for user-controlled values
//!
//! Values going into a search filter use filter escaping, values going into
//! a DN use RDN escaping. Templates are rendered in a single pass so a
//! substituted value is never scanned for further placeholders.

use ldap3::{dn_escape, ldap_escape};

/// Escape a value for use inside a search filter
pub fn filter_value(raw: &str) -> String {
    ldap_escape(raw).into_owned()
}

/// Escape a value for use as an RDN value inside a DN
pub fn rdn_value(raw: &str) -> String {
    dn_escape(raw).into_owned()
}

/// Replace `{name}` placeholders with the given values.
///
/// Unknown placeholders are left as they are. Values are inserted verbatim,
/// escape them before calling.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let substituted = tail.find('}').and_then(|end| {
            let name = &tail[1..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (end, *value))
        });

        match substituted {
            Some((end, value)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

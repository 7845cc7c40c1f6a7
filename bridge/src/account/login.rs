//! # Login strings
//!
//! Module dedicated to the login-string grammar of the frontends. A
//! mail client only offers one username field, so the key slot rides
//! inside it: `local[..slot][@domain]`.

use credentials::MAIN_KEY_SLOT;

/// Extracts the login and the key slot from a frontend login string.
///
/// Strings not matching the grammar (more than one `@`, more than one
/// `..` group in the local part) are returned unchanged with the
/// `main` slot.
pub fn decode_login(login: &str) -> (String, String) {
    let parts: Vec<&str> = login.split('@').collect();
    if parts.len() > 2 {
        return (login.to_owned(), MAIN_KEY_SLOT.to_owned());
    }

    let locals: Vec<&str> = parts[0].split("..").collect();
    if locals.len() > 2 {
        return (login.to_owned(), MAIN_KEY_SLOT.to_owned());
    }

    let mut name = locals[0].to_owned();
    let slot = if locals.len() == 2 {
        locals[1]
    } else {
        MAIN_KEY_SLOT
    };

    if parts.len() == 2 {
        name = format!("{name}@{}", parts[1]);
    }

    (name, slot.to_owned())
}

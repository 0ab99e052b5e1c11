//! Copy-ready text for one-shot credentials.

use std::fmt;

use insight_library_core::UserCredentials;

/// Invitation text an admin relays to the new user out of band.
///
/// `Display` includes the plaintext password, unlike the credentials'
/// `Debug` output. Render it only for the admin who requested it.
#[derive(Debug, Clone, Copy)]
pub struct CredentialsNotice<'a>(pub &'a UserCredentials);

impl fmt::Display for CredentialsNotice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credentials = self.0;
        writeln!(f, "You're invited to Game Industry Insight!")?;
        writeln!(f)?;
        writeln!(f, "Site: {}", credentials.site_url)?;
        writeln!(f, "Email: {}", credentials.email)?;
        writeln!(f, "Password: {}", credentials.password)?;
        if let Some(role) = credentials.role {
            writeln!(f, "Role: {role}")?;
        }
        writeln!(f)?;
        write!(f, "Please login and change your password after first login.")
    }
}

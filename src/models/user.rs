use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Account record as held by this service. Credentials live with the
/// account service that mints tokens; this side keeps the contact details,
/// the profile and the verification flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub location: String,
    pub phone: String,
    pub bio: String,
    pub interests: String,
    pub preferred_language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A first-seen account with an empty profile.
    pub fn new(
        id: Uuid,
        name: String,
        email: String,
        role: Role,
        is_email_verified: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            role,
            is_email_verified,
            location: String::new(),
            phone: String::new(),
            bio: String::new(),
            interests: String::new(),
            preferred_language: DEFAULT_LANGUAGE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub interests: Option<String>,
    pub preferred_language: Option<String>,
}

impl UpdateProfileRequest {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|n| n.trim().to_string()),
            email: self.email.map(|e| e.trim().to_lowercase()),
            ..self
        }
    }

    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(location) = self.location {
            user.location = location;
        }
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(bio) = self.bio {
            user.bio = bio;
        }
        if let Some(interests) = self.interests {
            user.interests = interests;
        }
        if let Some(language) = self.preferred_language {
            user.preferred_language = language;
        }
    }
}

/// University mail domains accounts may use.
pub const UNIVERSITY_DOMAINS: &[&str] = &[
    "umib.net",
    "uni-pr.edu",
    "uni-pr.edu.usitestat.com",
    "pr.ac.rs",
    "uni-prizren.com",
    "uni-gjk.org",
    "ushaf.net",
];

/// Whether the domain of `email` is one of `allowed`. An empty list admits
/// every domain.
pub fn is_allowed_domain(email: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match email.trim().to_lowercase().split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            allowed.iter().any(|d| d.eq_ignore_ascii_case(domain))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn university() -> Vec<String> {
        UNIVERSITY_DOMAINS.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn university_domains_are_admitted() {
        assert!(is_allowed_domain("Arta@UMIB.net", &university()));
        assert!(is_allowed_domain("dren@uni-pr.edu", &university()));
    }

    #[test]
    fn other_domains_are_refused() {
        assert!(!is_allowed_domain("someone@gmail.com", &university()));
        assert!(!is_allowed_domain("student.umib.net", &university()));
        assert!(!is_allowed_domain("@umib.net", &university()));
        assert!(!is_allowed_domain("x@sub.umib.net", &university()));
    }

    #[test]
    fn empty_list_admits_everyone() {
        assert!(is_allowed_domain("someone@gmail.com", &[]));
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut user = User::new(
            Uuid::new_v4(),
            "Arta".into(),
            "arta@umib.net".into(),
            Role::User,
            true,
            Utc::now(),
        );
        UpdateProfileRequest {
            bio: Some("Robotics club".into()),
            ..UpdateProfileRequest::default()
        }
        .apply(&mut user);

        assert_eq!(user.bio, "Robotics club");
        assert_eq!(user.name, "Arta");
        assert_eq!(user.preferred_language, DEFAULT_LANGUAGE);
    }
}

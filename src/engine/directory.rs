use ulid::Ulid;

use crate::model::*;

use super::Engine;

/// How a caller identifies the client being booked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectKey {
    Id(Ulid),
    /// Email address or phone number.
    Contact(String),
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectKey::Id(id) => write!(f, "{id}"),
            SubjectKey::Contact(c) => f.write_str(c),
        }
    }
}

fn phone_digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn matches_contact(user: &UserRecord, contact: &str) -> bool {
    let contact = contact.trim();
    if contact.is_empty() {
        return false;
    }
    if user
        .email
        .as_deref()
        .is_some_and(|e| e.trim().eq_ignore_ascii_case(contact))
    {
        return true;
    }
    let digits = phone_digits(contact);
    !digits.is_empty()
        && user
            .phone
            .as_deref()
            .is_some_and(|p| phone_digits(p) == digits)
}

/// Match strength of a staff record against an assignment reference.
/// Email beats display name; `None` means no match.
fn reference_rank(staff: &UserRecord, reference: &str) -> Option<u8> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if staff
        .email
        .as_deref()
        .is_some_and(|e| e.trim().eq_ignore_ascii_case(reference))
    {
        Some(0)
    } else if staff.name.trim() == reference {
        Some(1)
    } else {
        None
    }
}

/// Follow a subject's `assigned_to` reference to an eligible staff member.
///
/// Ties resolve to the best rank, then the smallest id, so the answer does not
/// depend on iteration order.
pub fn resolve_assignment<'a>(
    subject: &UserRecord,
    directory: impl IntoIterator<Item = &'a UserRecord>,
) -> Option<Ulid> {
    let reference = subject.assigned_to.as_deref()?;
    directory
        .into_iter()
        .filter(|u| u.role.owns_schedule())
        .filter_map(|u| reference_rank(u, reference).map(|rank| (rank, u.id)))
        .min()
        .map(|(_, id)| id)
}

impl Engine {
    /// Find a client record by id or by contact details.
    pub fn find_subject(&self, key: &SubjectKey) -> Option<UserRecord> {
        match key {
            SubjectKey::Id(id) => self
                .users
                .get(id)
                .filter(|u| u.role == Role::Client)
                .map(|u| u.value().clone()),
            SubjectKey::Contact(contact) => self
                .users
                .iter()
                .filter(|u| u.role == Role::Client && matches_contact(u.value(), contact))
                .map(|u| u.value().clone())
                .min_by_key(|u| u.id),
        }
    }

    /// The staff member a subject is assigned to, or `None` if the subject is
    /// unknown, unassigned, or assigned to someone who cannot be booked.
    pub fn resolve_assigned_resource(&self, key: &SubjectKey) -> Option<Ulid> {
        self.resolve_subject(key).map(|(_, resource_id)| resource_id)
    }

    /// Subject id together with its assigned staff member.
    pub(super) fn resolve_subject(&self, key: &SubjectKey) -> Option<(Ulid, Ulid)> {
        let subject = self.find_subject(key)?;
        let staff: Vec<UserRecord> = self
            .users
            .iter()
            .filter(|u| u.role.owns_schedule())
            .map(|u| u.value().clone())
            .collect();
        let resource_id = resolve_assignment(&subject, &staff)?;
        // A staff user without a schedule cannot be booked.
        self.schedules
            .contains_key(&resource_id)
            .then_some((subject.id, resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, name: &str, email: Option<&str>, phone: Option<&str>, assigned_to: Option<&str>) -> UserRecord {
        UserRecord {
            id: Ulid::new(),
            role,
            name: name.into(),
            email: email.map(Into::into),
            phone: phone.map(Into::into),
            assigned_to: assigned_to.map(Into::into),
        }
    }

    #[test]
    fn resolves_by_email_case_insensitively() {
        let staff = user(Role::Staff, "Dana Lee", Some("Dana@Clinic.test"), None, None);
        let client = user(Role::Client, "Sam", None, None, Some("dana@clinic.test"));
        assert_eq!(resolve_assignment(&client, [&staff]), Some(staff.id));
    }

    #[test]
    fn resolves_by_name_when_no_email_matches() {
        let staff = user(Role::Admin, "Dana Lee", None, None, None);
        let client = user(Role::Client, "Sam", None, None, Some(" Dana Lee "));
        assert_eq!(resolve_assignment(&client, [&staff]), Some(staff.id));
    }

    #[test]
    fn email_match_beats_name_match() {
        let by_name = user(Role::Staff, "dana@clinic.test", None, None, None);
        let by_email = user(Role::Staff, "Dana", Some("dana@clinic.test"), None, None);
        let client = user(Role::Client, "Sam", None, None, Some("dana@clinic.test"));
        assert_eq!(resolve_assignment(&client, [&by_name, &by_email]), Some(by_email.id));
    }

    #[test]
    fn clients_are_not_eligible() {
        let other_client = user(Role::Client, "Dana", Some("dana@clinic.test"), None, None);
        let client = user(Role::Client, "Sam", None, None, Some("dana@clinic.test"));
        assert_eq!(resolve_assignment(&client, [&other_client]), None);
    }

    #[test]
    fn unassigned_or_dangling_is_none() {
        let staff = user(Role::Staff, "Dana", Some("dana@clinic.test"), None, None);
        let unassigned = user(Role::Client, "Sam", None, None, None);
        let dangling = user(Role::Client, "Kim", None, None, Some("nobody@clinic.test"));
        let blank = user(Role::Client, "Lou", None, None, Some("   "));
        assert_eq!(resolve_assignment(&unassigned, [&staff]), None);
        assert_eq!(resolve_assignment(&dangling, [&staff]), None);
        assert_eq!(resolve_assignment(&blank, [&staff]), None);
    }

    #[test]
    fn contact_matching() {
        let client = user(Role::Client, "Sam", Some("sam@mail.test"), Some("+1 (555) 010-2000"), None);
        assert!(matches_contact(&client, "SAM@mail.test"));
        assert!(matches_contact(&client, "15550102000"));
        assert!(!matches_contact(&client, "5550102000"));
        assert!(!matches_contact(&client, ""));
        assert!(!matches_contact(&client, "no-digits"));
    }
}

//! `PLAIN` mechanism (RFC 4616): `authzid NUL authcid NUL password`.

use super::{MechanismStep, SaslMechanism};
use crate::accounts::UserAuthentication;
use crate::condition::SaslCondition;
use crate::jid::Entity;
use zeroize::Zeroizing;

/// The `PLAIN` mechanism
#[derive(Debug, Default, Clone, Copy)]
pub struct Plain;

impl Plain {
    fn authenticate(payload: &[u8], users: &dyn UserAuthentication, domain: &str) -> MechanismStep {
        let payload = Zeroizing::new(payload.to_vec());
        let mut parts = payload.split(|b| *b == 0);
        let (Some(authzid), Some(authcid), Some(password), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return MechanismStep::Failure(SaslCondition::MalformedRequest);
        };

        let (Ok(authzid), Ok(authcid), Ok(password)) = (
            std::str::from_utf8(authzid),
            std::str::from_utf8(authcid),
            std::str::from_utf8(password),
        ) else {
            return MechanismStep::Failure(SaslCondition::MalformedRequest);
        };

        if authcid.is_empty() || password.is_empty() {
            return MechanismStep::Failure(SaslCondition::MalformedRequest);
        }

        let Ok(user) = Entity::new(Some(authcid), domain, None) else {
            return MechanismStep::Failure(SaslCondition::MalformedRequest);
        };

        if !authzid.is_empty() && authzid != user.to_string() {
            tracing::debug!(%user, authzid, "PLAIN authorization identity rejected");
            return MechanismStep::Failure(SaslCondition::NotAuthorized);
        }

        if users.verify_credentials(&user, password) {
            MechanismStep::Success(user)
        } else {
            MechanismStep::Failure(SaslCondition::NotAuthorized)
        }
    }
}

impl SaslMechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn start(&self, initial: Option<&[u8]>, users: &dyn UserAuthentication, domain: &str) -> MechanismStep {
        match initial {
            None | Some([]) => MechanismStep::Challenge(Vec::new()),
            Some(payload) => Self::authenticate(payload, users, domain),
        }
    }

    fn respond(&self, response: &[u8], users: &dyn UserAuthentication, domain: &str) -> MechanismStep {
        Self::authenticate(response, users, domain)
    }
}

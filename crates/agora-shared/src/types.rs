use serde::{Deserialize, Serialize};

// User identity = forum `users.id` rowid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_is_a_bare_integer_on_the_wire() {
        assert_eq!(serde_json::to_string(&UserId(42)).unwrap(), "42");
        let id: UserId = serde_json::from_str("7").unwrap();
        assert_eq!(id, UserId(7));
    }
}

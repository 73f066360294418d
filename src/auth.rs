use teloxide::types::UserId;

/// Decides who may run privileged commands.
pub trait Authorizer: Send + Sync {
    fn is_permitted(&self, user: UserId) -> bool;
}

/// Fixed set of operator user IDs.
#[derive(Debug, Clone)]
pub struct AllowList {
    operators: Vec<UserId>,
}

impl AllowList {
    pub fn new(operators: impl IntoIterator<Item = u64>) -> Self {
        Self {
            operators: operators.into_iter().map(UserId).collect(),
        }
    }
}

impl Authorizer for AllowList {
    fn is_permitted(&self, user: UserId) -> bool {
        self.operators.contains(&user)
    }
}

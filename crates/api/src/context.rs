use bizhub_auth::Principal;

/// Who is calling, as established by the bearer middleware.
///
/// Present on every request; anonymous when no `Authorization` header was
/// sent. Gates decide whether anonymity is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    principal: Option<Principal>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

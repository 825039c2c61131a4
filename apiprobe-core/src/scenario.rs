//! The fixed scenario table.
//!
//! Each scenario carries a tagged [`Action`] describing the request to build,
//! so nothing is inferred from the id at run time.

use http::Method;

use crate::token::Corruption;

/// Scheme sent by the wrong-scheme scenario in place of `Bearer`.
pub const INVALID_SCHEME: &str = "Token";

/// Server-side token misconfiguration selected by `GET /user?mode=`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum UserMode {
    Expired,
    Nested,
    NestedExpired,
    BadSub,
    BadIss,
    NoNameEmail,
    BadEmail,
    EmailOnly,
    NameOnly,
}

/// Verbs of the order resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl OrderMethod {
    pub fn as_method(self) -> Method {
        match self {
            OrderMethod::Get => Method::GET,
            OrderMethod::Post => Method::POST,
            OrderMethod::Put => Method::PUT,
            OrderMethod::Patch => Method::PATCH,
            OrderMethod::Delete => Method::DELETE,
        }
    }
}

/// How the `Authorization` header of a discount request is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// No `Authorization` header at all.
    Missing,
    /// `Bearer <cached token>`.
    Valid,
    /// `<scheme> <cached token>`.
    Scheme(&'static str),
    /// `Bearer ` followed by nothing.
    Empty,
    /// `Bearer <cached token, corrupted>`.
    Corrupt(Corruption),
    /// `Bearer <token issued with ?mode=>`.
    Issued(UserMode),
}

/// What a scenario sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Order {
        method: OrderMethod,
        /// Whether the URL carries `?id=`.
        with_id: bool,
        /// Whether `Custom-Header` is sent.
        custom_header: bool,
    },
    Discount {
        auth: Auth,
    },
}

impl Action {
    /// Whether building this request needs the cached token.
    pub fn needs_cached_token(&self) -> bool {
        matches!(
            self,
            Action::Discount {
                auth: Auth::Valid | Auth::Scheme(_) | Auth::Corrupt(_)
            }
        )
    }

    /// The user mode to request a fresh token for, if any.
    pub fn issued_mode(&self) -> Option<UserMode> {
        match self {
            Action::Discount {
                auth: Auth::Issued(mode),
            } => Some(*mode),
            _ => None,
        }
    }
}

/// One named test case with an expected outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub id: &'static str,
    pub label: &'static str,
    pub expected_status_code: u16,
    pub action: Action,
}

const fn order(
    id: &'static str,
    label: &'static str,
    expected_status_code: u16,
    method: OrderMethod,
    with_id: bool,
    custom_header: bool,
) -> Scenario {
    Scenario {
        id,
        label,
        expected_status_code,
        action: Action::Order {
            method,
            with_id,
            custom_header,
        },
    }
}

const fn discount(
    id: &'static str,
    label: &'static str,
    expected_status_code: u16,
    auth: Auth,
) -> Scenario {
    Scenario {
        id,
        label,
        expected_status_code,
        action: Action::Discount { auth },
    }
}

static SCENARIOS: &[Scenario] = &[
    order("order-get-btn", "GET order list with Custom-Header", 200, OrderMethod::Get, false, true),
    order("order-get-id-btn", "GET order by id with Custom-Header", 200, OrderMethod::Get, true, true),
    order("order-post-btn", "POST order with Custom-Header", 201, OrderMethod::Post, false, true),
    order("order-put-btn", "PUT order without Custom-Header", 403, OrderMethod::Put, true, false),
    order("order-patch-btn", "PATCH order without Custom-Header", 403, OrderMethod::Patch, true, false),
    order("order-delete-btn", "DELETE order without Custom-Header", 403, OrderMethod::Delete, true, false),
    discount("discount-ok-btn", "valid token", 200, Auth::Valid),
    discount("discount-missing-auth-btn", "missing Authorization header", 403, Auth::Missing),
    discount("discount-bad-scheme-btn", "wrong scheme prefix", 403, Auth::Scheme(INVALID_SCHEME)),
    discount("discount-empty-token-btn", "empty bearer token", 403, Auth::Empty),
    discount("discount-bad-signature-btn", "signature last char flipped", 403, Auth::Corrupt(Corruption::FlipLastChar)),
    discount("discount-bad-symbol-btn", "invalid base64url symbol appended", 403, Auth::Corrupt(Corruption::InvalidSymbol)),
    discount("discount-short-token-btn", "token truncated to two segments", 403, Auth::Corrupt(Corruption::Truncate)),
    discount("discount-expired-btn", "expired token", 403, Auth::Issued(UserMode::Expired)),
    discount("discount-nested-btn", "nested token", 200, Auth::Issued(UserMode::Nested)),
    discount("discount-nested-expired-btn", "nested token with expired inner token", 403, Auth::Issued(UserMode::NestedExpired)),
    discount("discount-bad-sub-btn", "bad sub claim", 403, Auth::Issued(UserMode::BadSub)),
    discount("discount-bad-iss-btn", "bad iss claim", 403, Auth::Issued(UserMode::BadIss)),
    discount("discount-no-name-email-btn", "neither name nor email claim", 403, Auth::Issued(UserMode::NoNameEmail)),
    discount("discount-bad-email-btn", "malformed email claim", 403, Auth::Issued(UserMode::BadEmail)),
    discount("discount-email-only-btn", "email claim only", 200, Auth::Issued(UserMode::EmailOnly)),
    discount("discount-name-only-btn", "name claim only", 200, Auth::Issued(UserMode::NameOnly)),
];

/// Ordered, immutable list of scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioTable {
    scenarios: Vec<Scenario>,
}

impl Default for ScenarioTable {
    fn default() -> Self {
        ScenarioTable {
            scenarios: SCENARIOS.to_vec(),
        }
    }
}

impl ScenarioTable {
    /// Build a table from custom scenarios. Ids must be unique; later
    /// duplicates are dropped.
    pub fn new(scenarios: impl IntoIterator<Item = Scenario>) -> ScenarioTable {
        let mut unique: Vec<Scenario> = Vec::new();
        for scenario in scenarios {
            if unique.iter().any(|s| s.id == scenario.id) {
                tracing::warn!("duplicate scenario id \"{}\" ignored", scenario.id);
                continue;
            }
            unique.push(scenario);
        }
        ScenarioTable { scenarios: unique }
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

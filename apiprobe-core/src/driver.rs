//! Request driver: turns a scenario and a resolved token into a concrete
//! HTTP request.

use http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderMap, HeaderName, HeaderValue, Method,
};
use serde_json::{json, Value};
use url::Url;

use crate::{
    config::Config,
    scenario::{Action, Auth, OrderMethod, Scenario, UserMode},
    token::Token,
    Error, Result,
};

pub const CUSTOM_HEADER: HeaderName = HeaderName::from_static("custom-header");

const BEARER: &str = "Bearer";

/// A request ready to be sent, exactly as the scenario describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl PreparedRequest {
    fn get(url: Url) -> PreparedRequest {
        PreparedRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Driver {
    root: Url,
    order_id: u32,
    custom_header: String,
}

impl Driver {
    pub fn new(cfg: &Config) -> Result<Driver> {
        Ok(Driver {
            root: cfg.api_root()?,
            order_id: cfg.order_id,
            custom_header: cfg.custom_header.clone(),
        })
    }

    fn endpoint(&self, name: &str, query: Option<(&str, &str)>) -> Result<Url> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ValueError {
                key: "base_url".into(),
                reason: format!("{} cannot be a base", self.root),
            })?
            .pop_if_empty()
            .push(name);
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    pub fn order_url(&self, with_id: bool) -> Result<Url> {
        let id = self.order_id.to_string();
        self.endpoint("order", with_id.then_some(("id", id.as_str())))
    }

    pub fn user_url(&self, mode: Option<UserMode>) -> Result<Url> {
        let mode = mode.map(|m| m.to_string());
        self.endpoint("user", mode.as_deref().map(|m| ("mode", m)))
    }

    pub fn discount_url(&self) -> Result<Url> {
        self.endpoint("discount", None)
    }

    /// `GET /user[?mode=]`.
    pub fn user_request(&self, mode: Option<UserMode>) -> Result<PreparedRequest> {
        Ok(PreparedRequest::get(self.user_url(mode)?))
    }

    /// Build the request for `scenario`.
    ///
    /// `token` is the cached token for scenarios that start from it, or the
    /// freshly issued token for `Auth::Issued`. A missing token is replaced by
    /// the empty string.
    pub fn build(&self, scenario: &Scenario, token: Option<&Token>) -> Result<PreparedRequest> {
        match scenario.action {
            Action::Order {
                method,
                with_id,
                custom_header,
            } => self.order_request(method, with_id, custom_header),
            Action::Discount { auth } => self.discount_request(auth, token),
        }
    }

    fn order_request(
        &self,
        method: OrderMethod,
        with_id: bool,
        custom_header: bool,
    ) -> Result<PreparedRequest> {
        let mut headers = HeaderMap::new();
        if custom_header {
            headers.insert(CUSTOM_HEADER, header_value(&self.custom_header)?);
        }

        let body = order_body(method);
        if method != OrderMethod::Get {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        Ok(PreparedRequest {
            method: method.as_method(),
            url: self.order_url(with_id)?,
            headers,
            body,
        })
    }

    fn discount_request(&self, auth: Auth, token: Option<&Token>) -> Result<PreparedRequest> {
        let token = token.map(Token::as_str).unwrap_or_default();
        let authorization = match auth {
            Auth::Missing => None,
            Auth::Empty => Some(format!("{BEARER} ")),
            Auth::Valid | Auth::Issued(_) => Some(format!("{BEARER} {token}")),
            Auth::Scheme(scheme) => Some(format!("{scheme} {token}")),
            Auth::Corrupt(corruption) => Some(format!(
                "{BEARER} {}",
                Token::new(token).corrupt(corruption)
            )),
        };

        let mut req = PreparedRequest::get(self.discount_url()?);
        if let Some(authorization) = authorization {
            req.headers
                .insert(AUTHORIZATION, header_value(&authorization)?);
        }
        Ok(req)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::ValueError {
        key: "header".into(),
        reason: e.to_string(),
    })
}

/// Fixed literal bodies of the write-style order requests.
pub fn order_body(method: OrderMethod) -> Option<Value> {
    match method {
        OrderMethod::Get | OrderMethod::Delete => None,
        OrderMethod::Post => Some(json!({"title": "Test order", "price": 100, "status": "new"})),
        OrderMethod::Put => Some(json!({
            "title": "Replaced order",
            "price": 150,
            "status": "processing"
        })),
        OrderMethod::Patch => Some(json!({"status": "done"})),
    }
}

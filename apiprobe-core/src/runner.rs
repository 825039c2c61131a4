//! apiprobe's scenario runner.

use std::{ops::Deref, sync::Mutex};
use tokio::sync::{broadcast, Mutex as AsyncMutex, MutexGuard};
use tracing::*;

use crate::{
    config::{Config, TokenFallback},
    driver::Driver,
    evaluator::{evaluate, issued_token},
    http::{self, Client},
    scenario::{Scenario, ScenarioTable, UserMode},
    summary::{summarize, Results, ScenarioResult, Summary},
    token::Token,
    Error, Result,
};

/// Source recorded on http logs of token fetches triggered outside a scenario.
pub const TOKEN_FETCH: &str = "token-fetch";

#[derive(Debug, Clone)]
pub enum Message {
    Start(Scenario),
    HttpLog(&'static str, Box<http::Log>),
    End(Scenario, ScenarioResult),
    Summary(Summary),
    Reset,
}

/// Mutable part of the runner: per-scenario results and the token cache.
#[derive(Debug, Default)]
struct State {
    results: Results,
    token: Option<Token>,
}

/// Runs scenarios one at a time against the configured server.
///
/// `run_one`, `run_all`, `run_selected`, `reset` and `fetch_token` share a
/// single run lock. Triggering one while another holds it fails with
/// [`Error::RunInProgress`] and leaves every result untouched.
pub struct Runner {
    cfg: Config,
    client: Client,
    driver: Driver,
    table: ScenarioTable,
    state: AsyncMutex<State>,
    run_lock: AsyncMutex<()>,
    channel: Mutex<Option<broadcast::Sender<Message>>>,
}

impl Runner {
    pub fn new(cfg: Config) -> Result<Runner> {
        Runner::with_table(cfg, ScenarioTable::default())
    }

    pub fn with_table(cfg: Config, table: ScenarioTable) -> Result<Runner> {
        let client = Client::with_timeout(cfg.timeout)?;
        let driver = Driver::new(&cfg)?;
        let state = State {
            results: not_run(&table),
            token: None,
        };
        Ok(Runner {
            cfg,
            client,
            driver,
            table,
            state: AsyncMutex::new(state),
            run_lock: AsyncMutex::new(()),
            channel: Mutex::new(Some(broadcast::channel(1000).0)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn table(&self) -> &ScenarioTable {
        &self.table
    }

    /// Subscribe to the channel to see the real-time scenario events.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Message>> {
        let Ok(guard) = self.channel.lock() else {
            return Err(eyre::eyre!("failed to acquire runner channel lock").into());
        };
        let Some(tx) = guard.deref() else {
            return Err(eyre::eyre!("runner channel has been already closed").into());
        };
        Ok(tx.subscribe())
    }

    /// Close the event channel. Subscribed reporters stop once they drained it.
    pub fn close(&self) {
        if let Ok(mut guard) = self.channel.lock() {
            guard.take();
        }
    }

    fn publish(&self, msg: Message) {
        let Ok(guard) = self.channel.lock() else {
            error!("failed to acquire runner channel lock");
            return;
        };
        if let Some(tx) = guard.deref() {
            // Sending only fails when nobody listens.
            if tx.send(msg).is_err() {
                trace!("no subscriber for runner message");
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.run_lock.try_lock().map_err(|_| Error::RunInProgress)
    }

    pub async fn results(&self) -> Results {
        self.state.lock().await.results.clone()
    }

    pub async fn summary(&self) -> Summary {
        summarize(&self.table, &self.state.lock().await.results)
    }

    pub async fn cached_token(&self) -> Option<Token> {
        self.state.lock().await.token.clone()
    }

    /// Issue a token from `GET /user[?mode=]`. A plain fetch replaces the
    /// cached token; a mode fetch leaves it alone.
    pub async fn fetch_token(&self, mode: Option<UserMode>) -> Result<Token> {
        let _guard = self.lock()?;
        self.issue_token(TOKEN_FETCH, mode).await
    }

    async fn issue_token(&self, source: &'static str, mode: Option<UserMode>) -> Result<Token> {
        let req = self.driver.user_request(mode)?;
        let sent = self.client.send(&req).await;
        self.publish(Message::HttpLog(source, Box::new(sent.log)));

        let res = sent
            .result
            .map_err(|e| Error::TokenUnavailable(e.to_string()))?;
        let token = issued_token(res.text()).ok_or_else(|| {
            Error::TokenUnavailable(format!("{} {} returned no token", req.method, req.url))
        })?;

        if mode.is_none() {
            debug!("caching token from {}", req.url);
            self.state.lock().await.token = Some(token.clone());
        }
        Ok(token)
    }

    /// Resolve the token a scenario starts from. `Ok(None)` means the scenario
    /// needs none.
    async fn resolve_token(&self, scenario: &Scenario) -> Result<Option<Token>> {
        if let Some(mode) = scenario.action.issued_mode() {
            return self.issue_token(scenario.id, Some(mode)).await.map(Some);
        }
        if !scenario.action.needs_cached_token() {
            return Ok(None);
        }
        if let Some(token) = self.cached_token().await {
            return Ok(Some(token));
        }
        self.issue_token(scenario.id, None).await.map(Some)
    }

    async fn execute(&self, scenario: &Scenario) -> ScenarioResult {
        self.publish(Message::Start(scenario.clone()));

        let token = match self.resolve_token(scenario).await {
            Ok(token) => token,
            Err(e) => match self.cfg.token_fallback {
                TokenFallback::Abort => {
                    warn!("{}: {e}", scenario.id);
                    return self.record(scenario, ScenarioResult::failed(e.to_string())).await;
                }
                TokenFallback::Empty => {
                    warn!("{}: {e}, continuing with an empty token", scenario.id);
                    None
                }
            },
        };

        let req = match self.driver.build(scenario, token.as_ref()) {
            Ok(req) => req,
            Err(e) => {
                return self
                    .record(scenario, ScenarioResult::failed(format!("invalid request: {e}")))
                    .await
            }
        };

        let sent = self.client.send(&req).await;
        self.publish(Message::HttpLog(scenario.id, Box::new(sent.log)));

        let result = match sent.result {
            Ok(res) => evaluate(res.text(), scenario.expected_status_code).into(),
            Err(e) => ScenarioResult::failed(format!("request error: {e}")),
        };
        self.record(scenario, result).await
    }

    async fn record(&self, scenario: &Scenario, result: ScenarioResult) -> ScenarioResult {
        debug!("{} -> {}", scenario.id, result.status);
        self.state
            .lock()
            .await
            .results
            .insert(scenario.id, result.clone());
        self.publish(Message::End(scenario.clone(), result.clone()));
        result
    }

    fn scenario(&self, id: &str) -> Result<&Scenario> {
        self.table
            .get(id)
            .ok_or_else(|| Error::UnknownScenario(id.to_string()))
    }

    /// Run a single scenario and refresh the summary.
    pub async fn run_one(&self, id: &str) -> Result<ScenarioResult> {
        let scenario = self.scenario(id)?;
        let _guard = self.lock()?;
        let result = self.execute(scenario).await;
        self.publish(Message::Summary(self.summary().await));
        Ok(result)
    }

    /// Run every scenario in declared order.
    pub async fn run_all(&self) -> Result<Summary> {
        let _guard = self.lock()?;
        let scenarios: Vec<_> = self.table.iter().collect();
        self.run_serially(&scenarios).await
    }

    /// Run the given scenarios in declared table order. Unknown ids are
    /// rejected before anything runs.
    pub async fn run_selected(&self, ids: &[String]) -> Result<Summary> {
        for id in ids {
            self.scenario(id)?;
        }
        let _guard = self.lock()?;
        let scenarios: Vec<_> = self
            .table
            .iter()
            .filter(|s| ids.iter().any(|id| id == s.id))
            .collect();
        self.run_serially(&scenarios).await
    }

    async fn run_serially(&self, scenarios: &[&Scenario]) -> Result<Summary> {
        for (i, scenario) in scenarios.iter().enumerate() {
            if i > 0 && !self.cfg.pacing.is_zero() {
                tokio::time::sleep(self.cfg.pacing).await;
            }
            self.execute(scenario).await;
        }
        debug!("ran {} scenarios", scenarios.len());

        let summary = self.summary().await;
        self.publish(Message::Summary(summary.clone()));
        Ok(summary)
    }

    /// Set every result back to not run. The cached token is kept.
    pub async fn reset(&self) -> Result<Summary> {
        let _guard = self.lock()?;
        self.state.lock().await.results = not_run(&self.table);
        self.publish(Message::Reset);

        let summary = self.summary().await;
        self.publish(Message::Summary(summary.clone()));
        Ok(summary)
    }
}

fn not_run(table: &ScenarioTable) -> Results {
    table
        .iter()
        .map(|s| (s.id, ScenarioResult::default()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        scenario::{Action, OrderMethod},
        summary::Outcome,
    };
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const TOKEN: &str = "aaa.bbb.ccca";

    fn config(server: &mockito::Server) -> Config {
        Config {
            base_url: server.url(),
            base_path: "/api".into(),
            pacing: Duration::ZERO,
            ..Default::default()
        }
    }

    fn user_body(token: &str) -> String {
        format!(r#"{{"status":{{"code":200,"message":"OK"}},"data":{{"token":"{token}","header":{{"alg":"HS256"}}}}}}"#)
    }

    fn status_body(code: u16, message: &str) -> String {
        format!(r#"{{"data":null,"status":{{"code":{code},"message":"{message}"}}}}"#)
    }

    fn order_table() -> ScenarioTable {
        let order = |id, expected, method, custom_header| Scenario {
            id,
            label: id,
            expected_status_code: expected,
            action: Action::Order {
                method,
                with_id: false,
                custom_header,
            },
        };
        ScenarioTable::new(vec![
            order("get", 200, OrderMethod::Get, true),
            order("delete", 403, OrderMethod::Delete, false),
        ])
    }

    #[tokio::test]
    async fn valid_token_is_fetched_once_and_cached() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let user = server
            .mock("GET", "/api/user")
            .with_body(user_body(TOKEN))
            .expect(1)
            .create_async()
            .await;
        let discount = server
            .mock("GET", "/api/discount")
            .match_header("authorization", format!("Bearer {TOKEN}").as_str())
            .with_body(status_body(200, "OK"))
            .expect(2)
            .create_async()
            .await;

        let runner = Runner::new(config(&server))?;
        let first = runner.run_one("discount-ok-btn").await?;
        let second = runner.run_one("discount-ok-btn").await?;

        user.assert_async().await;
        discount.assert_async().await;
        assert_eq!(first.status, Outcome::Pass);
        assert_eq!(first.last_code, Some(200));
        assert_eq!(second, first);
        assert_eq!(runner.cached_token().await, Some(Token::new(TOKEN)));
        Ok(())
    }

    #[tokio::test]
    async fn corrupted_signature_is_sent() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/user")
            .with_body(user_body(TOKEN))
            .create_async()
            .await;
        let discount = server
            .mock("GET", "/api/discount")
            .match_header("authorization", "Bearer aaa.bbb.cccb")
            .with_status(403)
            .with_body(status_body(403, "Forbidden: signature invalid"))
            .create_async()
            .await;

        let runner = Runner::new(config(&server))?;
        let result = runner.run_one("discount-bad-signature-btn").await?;

        discount.assert_async().await;
        assert_eq!(result.status, Outcome::Pass);
        assert_eq!(
            result.last_message.as_deref(),
            Some("Forbidden: signature invalid")
        );
        // the cache keeps the valid token
        assert_eq!(runner.cached_token().await, Some(Token::new(TOKEN)));
        Ok(())
    }

    #[tokio::test]
    async fn issued_token_does_not_replace_cache() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let user = server
            .mock("GET", "/api/user")
            .match_query(Matcher::UrlEncoded("mode".into(), "expired".into()))
            .with_body(user_body("exp.ired.tok"))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/api/discount")
            .match_header("authorization", "Bearer exp.ired.tok")
            .with_status(403)
            .with_body(status_body(403, "Forbidden: token expired"))
            .create_async()
            .await;

        let runner = Runner::new(config(&server))?;
        let result = runner.run_one("discount-expired-btn").await?;

        user.assert_async().await;
        assert_eq!(result.status, Outcome::Pass);
        assert_eq!(runner.cached_token().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_token_aborts_by_default() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/user")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;
        let discount = server
            .mock("GET", "/api/discount")
            .expect(0)
            .create_async()
            .await;

        let runner = Runner::new(config(&server))?;
        let result = runner.run_one("discount-bad-scheme-btn").await?;

        discount.assert_async().await;
        assert_eq!(result.status, Outcome::Fail);
        assert_eq!(result.last_code, None);
        assert!(result
            .last_message
            .as_deref()
            .is_some_and(|m| m.starts_with("token unavailable")));
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_token_degrades_to_empty_when_configured() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/user")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;
        let discount = server
            .mock("GET", "/api/discount")
            .match_header("authorization", "Bearer *")
            .with_status(403)
            .with_body(status_body(403, "Forbidden: token has invalid base64url symbol '*'"))
            .expect(1)
            .create_async()
            .await;

        let cfg = Config {
            token_fallback: TokenFallback::Empty,
            ..config(&server)
        };
        let runner = Runner::new(cfg)?;
        let result = runner.run_one("discount-bad-symbol-btn").await?;

        discount.assert_async().await;
        assert_eq!(result.status, Outcome::Pass);
        Ok(())
    }

    #[tokio::test]
    async fn transport_error_is_a_failure() -> eyre::Result<()> {
        let cfg = Config {
            base_url: "http://127.0.0.1:1".into(),
            pacing: Duration::ZERO,
            ..Default::default()
        };
        let runner = Runner::new(cfg)?;
        let result = runner.run_one("order-get-btn").await?;

        assert_eq!(result.status, Outcome::Fail);
        assert!(result
            .last_message
            .as_deref()
            .is_some_and(|m| m.starts_with("request error")));
        Ok(())
    }

    #[tokio::test]
    async fn run_all_then_reset() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/order")
            .match_header("custom-header", "AnyValue123")
            .with_body(status_body(200, "OK"))
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/order")
            .with_status(403)
            .with_body(status_body(200, "unexpected"))
            .create_async()
            .await;

        let runner = Runner::with_table(config(&server), order_table())?;
        let summary = runner.run_all().await?;
        assert_eq!(
            (summary.total, summary.pass, summary.fail, summary.not_run),
            (2, 1, 1, 0)
        );
        assert_eq!(
            runner.results().await.keys().copied().collect::<Vec<_>>(),
            vec!["get", "delete"]
        );

        let summary = runner.reset().await?;
        assert_eq!(
            (summary.pass, summary.fail, summary.not_run),
            (0, 0, summary.total)
        );
        assert_eq!(runner.summary().await, summary);
        Ok(())
    }

    #[tokio::test]
    async fn run_selected_rejects_unknown_ids_up_front() -> eyre::Result<()> {
        let server = mockito::Server::new_async().await;
        let runner = Runner::with_table(config(&server), order_table())?;

        let err = runner
            .run_selected(&["get".to_string(), "nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownScenario(id) if id == "nope"));
        assert_eq!(runner.summary().await.not_run, 2);
        Ok(())
    }

    #[tokio::test]
    async fn run_selected_follows_table_order() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/order")
            .with_body(status_body(200, "OK"))
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/order")
            .with_body(status_body(403, "Forbidden: missing Custom-Header"))
            .create_async()
            .await;

        let runner = Runner::with_table(config(&server), order_table())?;
        let mut rx = runner.subscribe()?;
        let summary = runner
            .run_selected(&["delete".to_string(), "get".to_string()])
            .await?;
        runner.close();

        let mut ended = Vec::new();
        while let Ok(msg) = rx.recv().await {
            if let Message::End(s, _) = msg {
                ended.push(s.id);
            }
        }
        assert_eq!(ended, vec!["get", "delete"]);
        assert_eq!(summary.pass, 2);
        Ok(())
    }

    fn unreachable_config(pacing: Duration) -> Config {
        Config {
            base_url: "http://127.0.0.1:1".into(),
            base_path: "/api".into(),
            pacing,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_separates_scenarios() -> eyre::Result<()> {
        let pacing = Duration::from_millis(200);
        let runner = Runner::with_table(unreachable_config(pacing), order_table())?;

        let start = tokio::time::Instant::now();
        let summary = runner.run_all().await?;
        let elapsed = start.elapsed();
        assert!(elapsed >= pacing && elapsed < pacing * 2, "elapsed {elapsed:?}");
        assert_eq!(summary.fail, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn zero_pacing_does_not_sleep() -> eyre::Result<()> {
        let runner = Runner::with_table(unreachable_config(Duration::ZERO), order_table())?;

        let start = tokio::time::Instant::now();
        runner.run_all().await?;
        assert_eq!(start.elapsed(), Duration::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn run_lock_rejects_overlapping_runs() -> eyre::Result<()> {
        let server = mockito::Server::new_async().await;
        let runner = Runner::with_table(config(&server), order_table())?;

        let _held = runner.run_lock.lock().await;
        assert!(matches!(runner.run_one("get").await, Err(Error::RunInProgress)));
        assert!(matches!(runner.run_all().await, Err(Error::RunInProgress)));
        assert!(matches!(runner.reset().await, Err(Error::RunInProgress)));
        assert!(matches!(runner.fetch_token(None).await, Err(Error::RunInProgress)));
        assert_eq!(runner.summary().await.not_run, 2);
        Ok(())
    }

    #[tokio::test]
    async fn events_are_published_in_order() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/order")
            .with_body(status_body(200, "OK"))
            .create_async()
            .await;

        let runner = Runner::with_table(config(&server), order_table())?;
        let mut rx = runner.subscribe()?;
        runner.run_one("get").await?;
        runner.close();

        let mut kinds = Vec::new();
        while let Ok(msg) = rx.recv().await {
            kinds.push(match msg {
                Message::Start(s) => format!("start {}", s.id),
                Message::HttpLog(id, log) => format!("http {id} {}", log.request.method),
                Message::End(s, r) => format!("end {} {}", s.id, r.status),
                Message::Summary(s) => format!("summary {}", s.pass),
                Message::Reset => "reset".into(),
            });
        }
        assert_eq!(
            kinds,
            vec!["start get", "http get GET", "end get pass", "summary 1"]
        );
        assert!(runner.subscribe().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_scenario() -> eyre::Result<()> {
        let server = mockito::Server::new_async().await;
        let runner = Runner::new(config(&server))?;
        assert!(matches!(
            runner.run_one("no-such-btn").await,
            Err(Error::UnknownScenario(_))
        ));
        Ok(())
    }
}

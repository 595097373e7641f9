use std::fmt::{self, Display, Formatter};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::node::Node;
use crate::server::ResourceTemplate;

/// Per-node RPC client. One instance wraps one node's address and secret;
/// every operation is a single synchronous HTTP request with no retries —
/// the caller decides whether a failure needs compensation.
pub struct NodeClient {
    client: reqwest::Client,
    base: String,
    secret: String,
}

#[derive(Debug)]
pub enum Error {
    Unreachable(reqwest::Error),
    Status(reqwest::StatusCode, String),
    Decode(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Unreachable(e) => write!(f, "node unreachable: {}", e),
            Error::Status(code, body) => write!(f, "node returned {}: {}", code, body),
            Error::Decode(msg) => write!(f, "could not decode node response: {}", msg),
        }
    }
}

/// The closed set of error codes a node reports in the `msg` field of an
/// error body. Everything unrecognized collapses to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ServerLocked,
    ServerNotOff,
    ServerNotRunning,
    ServerNotStopped,
    ReinstallInstead,
    InstallInstead,
    PluginInstalled,
    InvalidPlugin,
    PluginNotSupported,
    PluginNotInstalled,
    FileNotFound,
    Unknown,
}

impl Error {
    /// Classify the raw error payload into a domain error code. Callers
    /// switch on this instead of ever inspecting response bodies.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Status(_, body) => classify(body),
            _ => ErrorCode::Unknown,
        }
    }
}

fn classify(body: &str) -> ErrorCode {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return ErrorCode::Unknown,
    };
    let msg = match parsed.get("msg").and_then(Value::as_str) {
        Some(m) => m,
        None => return ErrorCode::Unknown,
    };

    match msg {
        "SERVER_LOCKED" => ErrorCode::ServerLocked,
        "SERVER_NOT_OFF" => ErrorCode::ServerNotOff,
        "SERVER_NOT_RUNNING" => ErrorCode::ServerNotRunning,
        "SERVER_NOT_STOPPED" => ErrorCode::ServerNotStopped,
        "REINSTALL_INSTEAD" => ErrorCode::ReinstallInstead,
        "INSTALL_INSTEAD" => ErrorCode::InstallInstead,
        "PLUGIN_INSTALLED" => ErrorCode::PluginInstalled,
        "INVALID_PLUGIN" => ErrorCode::InvalidPlugin,
        "PLUGIN_NOT_SUPPORTED" => ErrorCode::PluginNotSupported,
        "PLUGIN_NOT_INSTALLED" => ErrorCode::PluginNotInstalled,
        "FILE_NOT_FOUND" => ErrorCode::FileNotFound,
        _ => ErrorCode::Unknown,
    }
}

type Result<T> = std::result::Result<T, Error>;

/// What a node reports about itself on `/node`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeQuery {
    pub cpu: f64,
    pub totalmem: u64,
    #[serde(default)]
    pub freemem: u64,
    pub totaldisk: u64,
    pub freedisk: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
    Kill,
}

impl Display for PowerAction {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            PowerAction::On => write!(f, "on"),
            PowerAction::Off => write!(f, "off"),
            PowerAction::Kill => write!(f, "kill"),
        }
    }
}

impl NodeClient {
    pub fn new(node: &Node) -> Self {
        Self::with_scheme(node, "https")
    }

    /// The scheme is a parameter so tests can run plain-http mock agents.
    /// Node agents use self-signed certificates, hence the cert bypass.
    pub fn with_scheme(node: &Node, scheme: &str) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("could not build http client");
        NodeClient {
            client,
            base: format!("{}://{}:{}", scheme, node.host, node.port),
            secret: node.secret.clone(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base, path);
        let res = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.secret))
            .send()
            .await
            .map_err(Error::Unreachable)?;

        Self::decode(res).await
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}", self.base, path);
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.secret))
            .form(form)
            .send()
            .await
            .map_err(Error::Unreachable)?;

        Self::decode(res).await
    }

    async fn decode(res: reqwest::Response) -> Result<Value> {
        let status = res.status();
        let body = res.text().await.map_err(Error::Unreachable)?;
        if !status.is_success() {
            return Err(Error::Status(status, body));
        }
        serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))
    }

    fn field<T: DeserializeOwned>(value: Value, name: &str) -> Result<T> {
        let inner = value
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Decode(format!("missing `{}` field", name)))?;
        serde_json::from_value(inner).map_err(|e| Error::Decode(e.to_string()))
    }

    pub async fn query(&self) -> Result<NodeQuery> {
        let value = self.get("node").await?;
        serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
    }

    pub async fn list_games(&self) -> Result<Vec<String>> {
        let value = self.get("game").await?;
        Self::field(value, "games")
    }

    pub async fn list_plugins(&self) -> Result<Vec<String>> {
        let value = self.get("plugin").await?;
        Self::field(value, "plugins")
    }

    pub async fn server_status(&self, id: Uuid) -> Result<Value> {
        self.get(&format!("server/{}", id)).await
    }

    pub async fn power(&self, id: Uuid, action: PowerAction) -> Result<()> {
        self.get(&format!("server/{}/power/{}", id, action)).await?;
        Ok(())
    }

    pub async fn install(&self, id: Uuid) -> Result<()> {
        self.get(&format!("server/{}/install", id)).await?;
        Ok(())
    }

    pub async fn reinstall(&self, id: Uuid) -> Result<()> {
        self.get(&format!("server/{}/reinstall", id)).await?;
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.get(&format!("server/{}/remove", id)).await?;
        Ok(())
    }

    /// Ask the node to create an instance from the template. Returns the
    /// port the node allocated for it.
    pub async fn allocate(&self, template: &ResourceTemplate, sftp_password: &str) -> Result<u16> {
        let config =
            serde_json::to_string(template).map_err(|e| Error::Decode(e.to_string()))?;
        let value = self
            .post(
                "server/add",
                &[("config", config.as_str()), ("password", sftp_password)],
            )
            .await?;

        value
            .pointer("/server/port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| Error::Decode("missing allocated port".to_string()))
    }

    pub async fn edit(&self, id: Uuid, template: &ResourceTemplate) -> Result<()> {
        let config =
            serde_json::to_string(template).map_err(|e| Error::Decode(e.to_string()))?;
        self.post(
            &format!("server/{}/edit", id),
            &[("config", config.as_str())],
        )
        .await?;
        Ok(())
    }

    pub async fn install_plugin(&self, id: Uuid, plugin: &str) -> Result<()> {
        self.post(&format!("server/{}/installPlugin", id), &[("plugin", plugin)])
            .await?;
        Ok(())
    }

    pub async fn remove_plugin(&self, id: Uuid, plugin: &str) -> Result<()> {
        self.post(&format!("server/{}/removePlugin", id), &[("plugin", plugin)])
            .await?;
        Ok(())
    }

    pub async fn reset_password(&self, id: Uuid, password: &str) -> Result<()> {
        self.post(
            &format!("server/{}/resetPassword", id),
            &[("password", password)],
        )
        .await?;
        Ok(())
    }

    pub async fn check_path_allowed(&self, id: Uuid, path: &str) -> Result<bool> {
        let value = self
            .post(&format!("server/{}/checkAllowed", id), &[("path", path)])
            .await?;
        Self::field(value, "allowed")
    }

    pub async fn file_contents(&self, id: Uuid, path: &str) -> Result<String> {
        let value = self
            .post(&format!("server/{}/fileContents", id), &[("path", path)])
            .await?;
        Self::field(value, "contents")
    }

    pub async fn list_dir(&self, id: Uuid, path: &str) -> Result<Value> {
        self.post(&format!("server/{}/getDir", id), &[("path", path)])
            .await
    }

    pub async fn write_file(&self, id: Uuid, path: &str, contents: &str) -> Result<()> {
        self.post(
            &format!("server/{}/writeFile", id),
            &[("path", path), ("contents", contents)],
        )
        .await?;
        Ok(())
    }

    pub async fn remove_file(&self, id: Uuid, path: &str) -> Result<()> {
        self.post(&format!("server/{}/removeFile", id), &[("path", path)])
            .await?;
        Ok(())
    }

    pub async fn remove_folder(&self, id: Uuid, path: &str) -> Result<()> {
        self.post(&format!("server/{}/removeFolder", id), &[("path", path)])
            .await?;
        Ok(())
    }

    pub async fn execute(&self, id: Uuid, command: &str) -> Result<()> {
        self.post(&format!("server/{}/execute", id), &[("command", command)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::extract::{Form, Path};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use crate::server::BuildLimits;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr, secret: &str) -> NodeClient {
        let node = Node::new("mock", "127.0.0.1", addr.port(), secret);
        NodeClient::with_scheme(&node, "http")
    }

    fn template() -> ResourceTemplate {
        ResourceTemplate {
            id: Uuid::new_v4(),
            game: "mc".to_string(),
            port: -1,
            build: BuildLimits { mem: 1024, io: 500, cpu: 100 },
            players: 20,
        }
    }

    #[test]
    fn classify_known_and_unknown_codes() {
        assert_eq!(classify(r#"{"msg":"SERVER_LOCKED"}"#), ErrorCode::ServerLocked);
        assert_eq!(classify(r#"{"msg":"FILE_NOT_FOUND"}"#), ErrorCode::FileNotFound);
        assert_eq!(classify(r#"{"msg":"SOMETHING_ELSE"}"#), ErrorCode::Unknown);
        assert_eq!(classify(r#"{"other":"field"}"#), ErrorCode::Unknown);
        assert_eq!(classify("not json at all"), ErrorCode::Unknown);
    }

    #[test]
    fn non_status_errors_classify_as_unknown() {
        let err = Error::Decode("bad".to_string());
        assert_eq!(err.code(), ErrorCode::Unknown);
    }

    #[tokio::test]
    async fn query_carries_the_secret_as_a_token_header() {
        let router = Router::new().route(
            "/node",
            get(|headers: HeaderMap| async move {
                if headers.get("authorization").map(|v| v.to_str().unwrap())
                    != Some("Token hunter2")
                {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"msg": "BAD_TOKEN"})));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "cpu": 0.25,
                        "totalmem": 16384,
                        "totaldisk": 100,
                        "freedisk": 60
                    })),
                )
            }),
        );
        let addr = serve(router).await;

        let query = client_for(addr, "hunter2").query().await.unwrap();
        assert_eq!(query.totaldisk, 100);
        assert_eq!(query.freedisk, 60);
        assert_eq!(query.freemem, 0);

        let err = client_for(addr, "wrong").query().await.unwrap_err();
        assert!(matches!(err, Error::Status(code, _) if code == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn list_games_unwraps_the_envelope() {
        let router = Router::new()
            .route("/game", get(|| async { Json(json!({"games": ["mc", "factorio"]})) }))
            .route("/plugin", get(|| async { Json(json!({"plugins": ["essentials"]})) }));
        let addr = serve(router).await;
        let client = client_for(addr, "s");

        assert_eq!(client.list_games().await.unwrap(), vec!["mc", "factorio"]);
        assert_eq!(client.list_plugins().await.unwrap(), vec!["essentials"]);
    }

    #[tokio::test]
    async fn allocate_posts_a_form_and_returns_the_port() {
        #[derive(serde::Deserialize)]
        struct AddForm {
            config: String,
            password: String,
        }

        let router = Router::new().route(
            "/server/add",
            post(|Form(form): Form<AddForm>| async move {
                let config: Value = serde_json::from_str(&form.config).unwrap();
                assert_eq!(config["game"], "mc");
                assert_eq!(config["port"], -1);
                assert_eq!(form.password, "sekrit");
                Json(json!({"server": {"port": 25565}}))
            }),
        );
        let addr = serve(router).await;

        let port = client_for(addr, "s")
            .allocate(&template(), "sekrit")
            .await
            .unwrap();
        assert_eq!(port, 25565);
    }

    #[tokio::test]
    async fn power_error_bodies_classify_into_domain_codes() {
        let router = Router::new().route(
            "/server/{id}/power/{action}",
            get(|Path((_, action)): Path<(Uuid, String)>| async move {
                assert_eq!(action, "on");
                (StatusCode::CONFLICT, Json(json!({"msg": "SERVER_LOCKED"})))
            }),
        );
        let addr = serve(router).await;

        let err = client_for(addr, "s")
            .power(Uuid::new_v4(), PowerAction::On)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerLocked);
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        let node = Node::new("gone", "127.0.0.1", 1, "s");
        let client = NodeClient::with_scheme(&node, "http");
        let err = client.query().await.unwrap_err();
        assert!(matches!(err, Error::Unreachable(_)));
        assert_eq!(err.code(), ErrorCode::Unknown);
    }

    #[tokio::test]
    async fn check_path_allowed_unwraps_the_flag() {
        let router = Router::new().route(
            "/server/{id}/checkAllowed",
            post(|Form(form): Form<std::collections::HashMap<String, String>>| async move {
                assert_eq!(form["path"], "/config/server.properties");
                Json(json!({"allowed": true}))
            }),
        );
        let addr = serve(router).await;

        let allowed = client_for(addr, "s")
            .check_path_allowed(Uuid::new_v4(), "/config/server.properties")
            .await
            .unwrap();
        assert!(allowed);
    }
}

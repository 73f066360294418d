use std::sync::Arc;

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use serde::Deserialize;

use crate::config;

const SESSION_HEADER: &str = "vmware-api-session-id";

#[derive(Debug, thiserror::Error)]
pub enum VsphereError {
    #[error("{0}")]
    Request(#[from] reqwest_middleware::Error),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: reqwest::Method,
        path: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("no default datacenter found")]
    NoDatacenter,

    #[error("default datacenter resolves to multiple instances ({0}), please specify")]
    AmbiguousDatacenter(usize),

    #[error("invalid virtual machine name pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("login esxi failed, reason:{0}")]
    Login(Box<VsphereError>),

    #[error("failed to get vm lists, reason:{0}")]
    List(Box<VsphereError>),

    #[error("failed to reboot virtual machine {name}: {source}")]
    Reboot {
        name: String,
        source: Box<VsphereError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

/// Snapshot of one virtual machine, fetched fresh for every listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRecord {
    pub name: String,
    pub power_state: PowerState,
    pub guest_os: Option<String>,
    pub cpu_count: Option<u32>,
    pub memory_mib: Option<u64>,
}

impl VmRecord {
    pub fn new(name: impl Into<String>, power_state: PowerState) -> Self {
        Self {
            name: name.into(),
            power_state,
            guest_os: None,
            cpu_count: None,
            memory_mib: None,
        }
    }
}

/// An authenticated API session. Hand it back to [`Hypervisor::disconnect`] when done.
#[derive(Debug)]
pub struct Session {
    id: String,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The operations the bot needs from a virtualization host.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    async fn connect(&self) -> Result<Session, VsphereError>;

    /// Every VM under the default datacenter, in the order the host reports them.
    async fn list_vms(&self, session: &Session) -> Result<Vec<VmRecord>, VsphereError>;

    /// Guest-reboots every VM whose name matches `pattern` and returns their names.
    /// A pattern that matches nothing is not an error.
    async fn reboot_vm(&self, session: &Session, pattern: &str)
    -> Result<Vec<String>, VsphereError>;

    async fn disconnect(&self, session: Session);
}

/// Opens a session, lists the VMs and closes the session again.
pub async fn list_all<H: Hypervisor + ?Sized>(
    hypervisor: &H,
) -> Result<Vec<VmRecord>, VsphereError> {
    let session = hypervisor
        .connect()
        .await
        .map_err(|why| VsphereError::Login(Box::new(why)))?;
    let res = hypervisor
        .list_vms(&session)
        .await
        .map_err(|why| VsphereError::List(Box::new(why)));
    hypervisor.disconnect(session).await;
    res
}

/// Opens a session, reboots the matching VMs and closes the session again.
pub async fn reboot<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    pattern: &str,
) -> Result<Vec<String>, VsphereError> {
    let session = hypervisor
        .connect()
        .await
        .map_err(|why| VsphereError::Login(Box::new(why)))?;
    let res = hypervisor.reboot_vm(&session, pattern).await;
    hypervisor.disconnect(session).await;
    res
}

#[derive(Deserialize)]
struct DatacenterSummary {
    datacenter: String,
    name: String,
}

#[derive(Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
}

#[derive(Deserialize)]
struct VmInfo {
    name: String,
    power_state: PowerState,
    #[serde(rename = "guest_OS")]
    guest_os: Option<String>,
    cpu: Option<CpuInfo>,
    memory: Option<MemoryInfo>,
}

#[derive(Deserialize)]
struct CpuInfo {
    count: u32,
}

#[derive(Deserialize)]
struct MemoryInfo {
    #[serde(rename = "size_MiB")]
    size_mib: u64,
}

impl From<VmInfo> for VmRecord {
    fn from(info: VmInfo) -> Self {
        Self {
            guest_os: info.guest_os,
            cpu_count: info.cpu.map(|c| c.count),
            memory_mib: info.memory.map(|m| m.size_mib),
            ..Self::new(info.name, info.power_state)
        }
    }
}

/// Logs every request the vSphere client makes.
struct TraceRequests;

#[async_trait]
impl Middleware for TraceRequests {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let path = req.url().path().to_string();
        let started = std::time::Instant::now();
        let res = next.run(req, extensions).await;
        match &res {
            Ok(res) => tracing::debug!(
                "{} {} -> {} in {:?}",
                method,
                path,
                res.status(),
                started.elapsed()
            ),
            Err(why) => tracing::debug!("{} {} failed: {}", method, path, why),
        }
        res
    }
}

/// vSphere Automation REST client.
#[derive(Clone)]
pub struct Api {
    inner: Arc<Inner>,
    client: ClientWithMiddleware,
}

struct Inner {
    base_url: String,
    username: String,
    password: String,
}

impl Api {
    pub fn from_config(conf: &config::VsphereAuth) -> Result<Self, VsphereError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(conf.allow_invalid_cert)
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                base_url: conf.url.clone(),
                username: conf.user.clone(),
                password: conf.password.clone(),
            }),
            client: ClientBuilder::new(client).with(TraceRequests).build(),
        })
    }

    fn session_request(
        &self,
        method: reqwest::Method,
        path: &str,
        session: &Session,
    ) -> reqwest_middleware::RequestBuilder {
        let url = format!("{}/api{}", self.inner.base_url, path);
        self.client
            .request(method, url)
            .header(SESSION_HEADER, session.id())
    }

    async fn default_datacenter(&self, session: &Session) -> Result<String, VsphereError> {
        tracing::debug!("Resolving default datacenter");
        let res = self
            .session_request(reqwest::Method::GET, "/vcenter/datacenter", session)
            .send()
            .await?;
        let res = expect_success(reqwest::Method::GET, "/vcenter/datacenter", res).await?;
        let mut datacenters: Vec<DatacenterSummary> = res.json().await?;

        match datacenters.len() {
            0 => Err(VsphereError::NoDatacenter),
            1 => {
                let dc = datacenters.remove(0);
                tracing::debug!("Default datacenter is {} ({})", dc.name, dc.datacenter);
                Ok(dc.datacenter)
            }
            n => Err(VsphereError::AmbiguousDatacenter(n)),
        }
    }

    async fn vm_summaries(&self, session: &Session) -> Result<Vec<VmSummary>, VsphereError> {
        let datacenter = self.default_datacenter(session).await?;
        tracing::debug!("Listing VMs in {}", datacenter);
        let res = self
            .session_request(reqwest::Method::GET, "/vcenter/vm", session)
            .query(&[("datacenters", datacenter.as_str())])
            .send()
            .await?;
        let res = expect_success(reqwest::Method::GET, "/vcenter/vm", res).await?;
        Ok(res.json().await?)
    }

    async fn vm_detail(&self, session: &Session, vm: &str) -> Result<VmRecord, VsphereError> {
        tracing::debug!("Fetching detail of {}", vm);
        let path = format!("/vcenter/vm/{vm}");
        let res = self
            .session_request(reqwest::Method::GET, &path, session)
            .send()
            .await?;
        let res = expect_success(reqwest::Method::GET, &path, res).await?;
        let info: VmInfo = res.json().await?;
        Ok(info.into())
    }

    async fn reboot_guest(&self, session: &Session, vm: &str) -> Result<(), VsphereError> {
        let path = format!("/vcenter/vm/{vm}/guest/power");
        let res = self
            .session_request(reqwest::Method::POST, &path, session)
            .query(&[("action", "reboot")])
            .send()
            .await?;
        expect_success(reqwest::Method::POST, &path, res).await?;
        Ok(())
    }
}

#[async_trait]
impl Hypervisor for Api {
    async fn connect(&self) -> Result<Session, VsphereError> {
        tracing::debug!("Creating session as {}", self.inner.username);
        let res = self
            .client
            .post(format!("{}/api/session", self.inner.base_url))
            .basic_auth(&self.inner.username, Some(&self.inner.password))
            .send()
            .await?;
        let res = expect_success(reqwest::Method::POST, "/session", res).await?;
        let id: String = res.json().await?;
        Ok(Session::new(id))
    }

    async fn list_vms(&self, session: &Session) -> Result<Vec<VmRecord>, VsphereError> {
        let summaries = self.vm_summaries(session).await?;
        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let record = self.vm_detail(session, &summary.vm).await?;
            tracing::debug!(
                "{} is {:?} (guest {:?}, {:?} vCPU, {:?} MiB)",
                record.name,
                record.power_state,
                record.guest_os,
                record.cpu_count,
                record.memory_mib
            );
            records.push(record);
        }
        Ok(records)
    }

    async fn reboot_vm(
        &self,
        session: &Session,
        pattern: &str,
    ) -> Result<Vec<String>, VsphereError> {
        let matcher = NamePattern::new(pattern)?;
        let targets: Vec<VmSummary> = self
            .vm_summaries(session)
            .await?
            .into_iter()
            .filter(|vm| matcher.matches(&vm.name))
            .collect();

        if targets.is_empty() {
            tracing::warn!("No virtual machine matches {:?}, nothing rebooted", pattern);
        }

        let mut rebooted = Vec::with_capacity(targets.len());
        for vm in targets {
            tracing::info!("Rebooting guest of {} ({})", vm.name, vm.vm);
            if let Err(why) = self.reboot_guest(session, &vm.vm).await {
                return Err(VsphereError::Reboot {
                    name: vm.name,
                    source: Box::new(why),
                });
            }
            rebooted.push(vm.name);
        }
        Ok(rebooted)
    }

    async fn disconnect(&self, session: Session) {
        tracing::debug!("Deleting session");
        let res = self
            .session_request(reqwest::Method::DELETE, "/session", &session)
            .send()
            .await;
        match res {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => tracing::warn!("Logout returned {}", res.status()),
            Err(why) => tracing::warn!("Logout failed: {}", why),
        }
    }
}

async fn expect_success(
    method: reqwest::Method,
    path: &str,
    res: reqwest::Response,
) -> Result<reqwest::Response, VsphereError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(VsphereError::Status {
        method,
        path: path.to_string(),
        status,
        body,
    })
}

/// Shell-style VM name pattern: `*` and `?` wildcards, `[...]` classes
/// (`[^...]` negated), `\` escapes. Wildcards never match `/`, as in
/// inventory paths.
struct NamePattern(regex::Regex);

impl NamePattern {
    fn new(pattern: &str) -> Result<Self, VsphereError> {
        let invalid = |reason: &str| VsphereError::Pattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut re = String::from("^");
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => re.push_str("[^/]*"),
                '?' => re.push_str("[^/]"),
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| invalid("trailing backslash"))?;
                    re.push_str(&regex::escape(&escaped.to_string()));
                }
                '[' => {
                    re.push('[');
                    let mut members = 0;
                    let mut closed = false;
                    let mut first = true;
                    while let Some(c) = chars.next() {
                        match c {
                            ']' if members > 0 => {
                                closed = true;
                                break;
                            }
                            '^' if first => re.push('^'),
                            '-' => re.push('-'),
                            '\\' => {
                                let escaped =
                                    chars.next().ok_or_else(|| invalid("trailing backslash"))?;
                                push_class_member(&mut re, escaped);
                                members += 1;
                            }
                            c => {
                                push_class_member(&mut re, c);
                                members += 1;
                            }
                        }
                        first = false;
                    }
                    if !closed {
                        return Err(invalid("unterminated character class"));
                    }
                    re.push(']');
                }
                c => re.push_str(&regex::escape(&c.to_string())),
            }
        }
        re.push('$');

        regex::Regex::new(&re)
            .map(Self)
            .map_err(|why| invalid(&why.to_string()))
    }

    fn matches(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

/// Adds `c` to a regex character class as a literal.
fn push_class_member(re: &mut String, c: char) {
    if !(c.is_ascii_alphanumeric() || !c.is_ascii() || c == '<' || c == '>') {
        re.push('\\');
    }
    re.push(c);
}

//! Posture probes: the routines that materialize posture proofs.
//!
//! Each probe receives the posture query id and a reply handle; the handle
//! consumes itself on use, so a probe can answer at most once. Consumers may
//! replace any probe through [`ProbeOverrides`]; the default probes gather
//! facts from the host.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha512};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use trellis_core::posture::PostureSubmission;

/// Cache key of the OS probe.
pub const PROBE_OS: &str = "OS";
/// Cache key of the MAC probe.
pub const PROBE_MAC: &str = "MAC";
/// Cache key of the domain probe.
pub const PROBE_DOMAIN: &str = "DOMAIN";

/// A probe's answer on its way back to the engine cache.
#[derive(Debug)]
pub(crate) struct ProbeReply {
    /// Cache key: a singleton probe type or a process path.
    pub cache_key: String,
    /// Serialized posture payload.
    pub body: String,
}

pub(crate) type ReplyTx = mpsc::UnboundedSender<ProbeReply>;

fn deliver(tx: &ReplyTx, cache_key: String, submission: &PostureSubmission) {
    match serde_json::to_string(submission) {
        Ok(body) => {
            // the engine may already be gone; late replies are dropped there anyway
            let _ = tx.send(ProbeReply { cache_key, body });
        }
        Err(e) => warn!(error = %e, "failed to serialize posture payload"),
    }
}

/// Reply handle of the OS probe.
pub struct OsReply {
    pub(crate) query_id: String,
    pub(crate) tx: ReplyTx,
}

impl OsReply {
    pub fn respond(self, os_type: &str, version: &str, build: &str) {
        let submission = PostureSubmission::Os {
            id: self.query_id,
            os_type: os_type.to_string(),
            version: version.to_string(),
            build: build.to_string(),
        };
        deliver(&self.tx, PROBE_OS.to_string(), &submission);
    }
}

/// Reply handle of the MAC probe.
pub struct MacReply {
    pub(crate) query_id: String,
    pub(crate) tx: ReplyTx,
}

impl MacReply {
    pub fn respond(self, mac_addresses: Vec<String>) {
        let submission = PostureSubmission::Mac {
            id: self.query_id,
            mac_addresses,
        };
        deliver(&self.tx, PROBE_MAC.to_string(), &submission);
    }
}

/// Reply handle of the domain probe.
pub struct DomainReply {
    pub(crate) query_id: String,
    pub(crate) tx: ReplyTx,
}

impl DomainReply {
    pub fn respond(self, domain: &str) {
        let submission = PostureSubmission::Domain {
            id: self.query_id,
            domain: domain.to_string(),
        };
        deliver(&self.tx, PROBE_DOMAIN.to_string(), &submission);
    }
}

/// Reply handle of the process probe. Keyed by process path.
pub struct ProcessReply {
    pub(crate) query_id: String,
    pub(crate) path: String,
    pub(crate) tx: ReplyTx,
}

impl ProcessReply {
    pub fn respond(self, is_running: bool, sha512_hex: &str, signers: Vec<String>) {
        let submission = PostureSubmission::Process {
            id: self.query_id,
            path: self.path.clone(),
            is_running,
            hash: sha512_hex.to_string(),
            signers,
        };
        deliver(&self.tx, self.path, &submission);
    }
}

/// Probe callback types for consumer overrides. Every override receives the
/// posture query id and must invoke the reply exactly once; the handles take
/// `self` by value, so a second invocation does not compile.
pub type OsProbe = Arc<dyn Fn(&str, OsReply) + Send + Sync>;
pub type MacProbe = Arc<dyn Fn(&str, MacReply) + Send + Sync>;
pub type DomainProbe = Arc<dyn Fn(&str, DomainReply) + Send + Sync>;
/// Receives the query id, the process path, and the reply handle.
pub type ProcessProbe = Arc<dyn Fn(&str, &str, ProcessReply) + Send + Sync>;

/// Consumer replacements for the built-in probes.
#[derive(Clone, Default)]
pub struct ProbeOverrides {
    pub os: Option<OsProbe>,
    pub mac: Option<MacProbe>,
    pub domain: Option<DomainProbe>,
    pub process: Option<ProcessProbe>,
}

// ---------------------------------------------------------------------
// Default probes
// ---------------------------------------------------------------------

/// OS facts from the host. Replies synchronously.
pub(crate) fn default_os(reply: OsReply) {
    let os_type = sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
    let version = sysinfo::System::os_version().unwrap_or_default();
    let build = sysinfo::System::kernel_version().unwrap_or_default();
    reply.respond(&os_type, &version, &build);
}

/// MAC addresses of the host's interfaces. Replies synchronously.
pub(crate) fn default_mac(reply: MacReply) {
    reply.respond(collect_mac_addresses());
}

/// Non-loopback interface MACs, de-duplicated by interface name and sorted
/// so an unchanged interface set serializes byte-identically every tick.
fn collect_mac_addresses() -> Vec<String> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    let mut seen_names: HashSet<String> = HashSet::new();
    let mut addresses = Vec::new();
    for interface in interfaces {
        if interface.is_loopback() || !seen_names.insert(interface.name.clone()) {
            continue;
        }
        match mac_address::mac_address_by_name(&interface.name) {
            Ok(Some(mac)) if mac.bytes().iter().any(|b| *b != 0) => {
                addresses.push(format_mac(&mac.bytes()));
            }
            Ok(_) => {}
            Err(e) => debug!(interface = %interface.name, error = %e, "no MAC for interface"),
        }
    }
    addresses.sort();
    addresses.dedup();
    addresses
}

pub(crate) fn format_mac(bytes: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}

/// The joined Windows domain; empty elsewhere. Replies synchronously.
pub(crate) fn default_domain(reply: DomainReply) {
    reply.respond(&joined_domain());
}

#[cfg(windows)]
fn joined_domain() -> String {
    use windows_sys::Win32::NetworkManagement::NetManagement::{
        NetApiBufferFree, NetGetJoinInformation,
    };

    let mut buffer: *mut u16 = std::ptr::null_mut();
    let mut join_status: i32 = 0;
    let rc = unsafe { NetGetJoinInformation(std::ptr::null(), &mut buffer, &mut join_status) };
    if rc != 0 || buffer.is_null() {
        return String::new();
    }
    let len = (0..).take_while(|&i| unsafe { *buffer.add(i) } != 0).count();
    let domain = String::from_utf16_lossy(unsafe { std::slice::from_raw_parts(buffer, len) });
    unsafe { NetApiBufferFree(buffer.cast()) };
    domain
}

#[cfg(not(windows))]
fn joined_domain() -> String {
    String::new()
}

// ---------------------------------------------------------------------
// Process facts (run on the blocking pool by the engine)
// ---------------------------------------------------------------------

/// Everything the process probe reports about one watched binary.
#[derive(Debug, Default, Clone)]
pub(crate) struct ProcessFacts {
    pub is_running: bool,
    pub sha512_hex: String,
    pub signers: Vec<String>,
}

/// Gather process facts for `path`. Blocking: file hashing plus a walk of
/// the live process table.
pub(crate) fn process_facts(path: &str) -> ProcessFacts {
    let mut facts = ProcessFacts::default();
    if !Path::new(path).exists() {
        return facts;
    }
    facts.is_running = is_process_running(path);
    match hash_file_sha512(path) {
        Ok(digest) => facts.sha512_hex = digest,
        Err(e) => warn!(path = %path, error = %e, "failed to hash process image"),
    }
    facts.signers = authenticode_signers(path);
    facts
}

/// SHA-512 over the file contents, streamed in 64 KiB chunks.
fn hash_file_sha512(path: &str) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// True when a process with this image path is currently running.
fn is_process_running(path: &str) -> bool {
    let target = Path::new(path);
    let system = sysinfo::System::new_all();
    let running = system.processes().values().any(|process| {
        process.exe().is_some_and(|exe| {
            if cfg!(windows) {
                exe.to_string_lossy()
                    .eq_ignore_ascii_case(&target.to_string_lossy())
            } else {
                exe == target
            }
        })
    });
    debug!(path = %path, running, "process running check");
    running
}

/// SHA-1 thumbprints of the certificates in the file's Authenticode
/// signature. Windows only; empty elsewhere.
#[cfg(windows)]
fn authenticode_signers(path: &str) -> Vec<String> {
    use windows_sys::Win32::Security::Cryptography::{
        CertCloseStore, CertEnumCertificatesInStore, CertGetCertificateContextProperty,
        CryptMsgClose, CryptQueryObject, CERT_QUERY_CONTENT_FLAG_PKCS7_SIGNED_EMBED,
        CERT_QUERY_FORMAT_FLAG_BINARY, CERT_QUERY_OBJECT_FILE, CERT_SHA1_HASH_PROP_ID,
    };

    let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
    let mut store = std::ptr::null_mut();
    let mut msg = std::ptr::null_mut();
    let (mut encoding, mut content_type, mut format_type) = (0u32, 0u32, 0u32);

    let ok = unsafe {
        CryptQueryObject(
            CERT_QUERY_OBJECT_FILE,
            wide.as_ptr().cast(),
            CERT_QUERY_CONTENT_FLAG_PKCS7_SIGNED_EMBED,
            CERT_QUERY_FORMAT_FLAG_BINARY,
            0,
            &mut encoding,
            &mut content_type,
            &mut format_type,
            &mut store,
            &mut msg,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Vec::new();
    }

    let mut thumbprints = Vec::new();
    let mut cert = unsafe { CertEnumCertificatesInStore(store, std::ptr::null()) };
    while !cert.is_null() {
        let mut sha1 = [0u8; 20];
        let mut size = sha1.len() as u32;
        let rc = unsafe {
            CertGetCertificateContextProperty(
                cert,
                CERT_SHA1_HASH_PROP_ID,
                sha1.as_mut_ptr().cast(),
                &mut size,
            )
        };
        if rc != 0 {
            thumbprints.push(hex::encode(&sha1[..size as usize]));
        } else {
            warn!(path = %path, "failed to read certificate thumbprint");
        }
        cert = unsafe { CertEnumCertificatesInStore(store, cert) };
    }
    unsafe {
        CertCloseStore(store, 0);
        CryptMsgClose(msg);
    }
    thumbprints
}

#[cfg(not(windows))]
fn authenticode_signers(_path: &str) -> Vec<String> {
    Vec::new()
}

//! The closed set of ECA status codes.
//!
//! A status value on the wire packs a message code and a severity:
//! `((code << 3) & 0xFFF8) | (severity & 0x0007)`. The low severity bit is
//! the success bit. Codes marked `defunct` are never produced by current
//! servers but may still arrive from very old peers.

/// Severity bits of a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Severity {
    /// Unsuccessful.
    Warning = 0,
    /// Successful.
    Success = 1,
    /// Failed; continue.
    Error = 2,
    /// Successful.
    Info = 3,
    /// Failed; quit.
    Severe = 4,
    /// Error | Severe.
    Fatal = 6,
}

impl Severity {
    /// The low severity bit doubles as the success flag.
    pub const fn success(self) -> bool {
        (self as u16) & 0x0001 == 1
    }
}

/// One entry of the ECA status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode {
    pub name: &'static str,
    pub code: u16,
    pub severity: Severity,
    pub defunct: bool,
    pub description: &'static str,
}

impl StatusCode {
    /// The combined wire value.
    pub const fn code_with_severity(&self) -> u16 {
        ((self.code << 3) & 0xFFF8) | ((self.severity as u16) & 0x0007)
    }

    pub const fn success(&self) -> bool {
        self.severity.success()
    }

    /// Look up a wire status value. Returns `None` for out-of-table codes
    /// or severity bits that do not match the canonical entry.
    pub fn from_code_with_severity(raw: u16) -> Option<&'static StatusCode> {
        let entry = ALL_STATUS_CODES.get((raw >> 3) as usize)?;
        (entry.code_with_severity() == raw).then_some(entry)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.description)
    }
}

macro_rules! status_codes {
    ($($name:ident = ($code:expr, $severity:ident, $defunct:expr, $desc:expr);)*) => {
        $(
            pub const $name: StatusCode = StatusCode {
                name: stringify!($name),
                code: $code,
                severity: Severity::$severity,
                defunct: $defunct,
                description: $desc,
            };
        )*

        /// Every status code, indexed by its message code.
        pub const ALL_STATUS_CODES: &[StatusCode] = &[$($name),*];
    };
}

status_codes! {
    ECA_NORMAL = (0, Success, false, "Normal successful completion");
    ECA_MAXIOC = (1, Error, true, "Maximum simultaneous IOC connections exceeded");
    ECA_UKNHOST = (2, Error, true, "Unknown internet host");
    ECA_UKNSERV = (3, Error, true, "Unknown internet service");
    ECA_SOCK = (4, Error, true, "Unable to allocate a new socket");
    ECA_CONN = (5, Warning, true, "Unable to connect to internet host or service");
    ECA_ALLOCMEM = (6, Warning, false, "Unable to allocate additional dynamic memory");
    ECA_UKNCHAN = (7, Warning, true, "Unknown IO channel");
    ECA_UKNFIELD = (8, Warning, true, "Record field specified inappropriate for channel specified");
    ECA_TOLARGE = (9, Warning, false, "The requested data transfer is greater than available memory or EPICS_CA_MAX_ARRAY_BYTES");
    ECA_TIMEOUT = (10, Warning, false, "User specified timeout on IO operation expired");
    ECA_NOSUPPORT = (11, Warning, true, "Sorry, that feature is planned but not supported at this time");
    ECA_STRTOBIG = (12, Warning, true, "The supplied string is unusually large");
    ECA_DISCONNCHID = (13, Error, true, "The request was ignored because the specified channel is disconnected");
    ECA_BADTYPE = (14, Error, false, "The data type specifed is invalid");
    ECA_CHIDNOTFND = (15, Info, true, "Remote Channel not found");
    ECA_CHIDRETRY = (16, Info, true, "Unable to locate all user specified channels");
    ECA_INTERNAL = (17, Fatal, false, "Channel Access Internal Failure");
    ECA_DBLCLFAIL = (18, Warning, true, "The requested local DB operation failed");
    ECA_GETFAIL = (19, Warning, false, "Channel read request failed");
    ECA_PUTFAIL = (20, Warning, false, "Channel write request failed");
    ECA_ADDFAIL = (21, Warning, true, "Channel subscription request failed");
    ECA_BADCOUNT = (22, Warning, false, "Invalid element count requested");
    ECA_BADSTR = (23, Error, false, "Invalid string");
    ECA_DISCONN = (24, Warning, false, "Virtual circuit disconnect");
    ECA_DBLCHNL = (25, Warning, false, "Identical process variable name on multiple servers");
    ECA_EVDISALLOW = (26, Error, false, "Request inappropriate within subscription (monitor) update callback");
    ECA_BUILDGET = (27, Warning, true, "Database value get for that channel failed during channel search");
    ECA_NEEDSFP = (28, Warning, true, "Unable to initialize without the vxWorks VX_FP_TASK task option set");
    ECA_OVEVFAIL = (29, Warning, true, "Event queue overflow has prevented first pass event after event add");
    ECA_BADMONID = (30, Error, false, "Bad event subscription (monitor) identifier");
    ECA_NEWADDR = (31, Warning, true, "Remote channel has new network address");
    ECA_NEWCONN = (32, Info, true, "New or resumed network connection");
    ECA_NOCACTX = (33, Warning, true, "Specified task isnt a member of a CA context");
    ECA_DEFUNCT = (34, Fatal, true, "Attempt to use defunct CA feature failed");
    ECA_EMPTYSTR = (35, Warning, true, "The supplied string is empty");
    ECA_NOREPEATER = (36, Warning, true, "Unable to spawn the CA repeater thread; auto reconnect will fail");
    ECA_NOCHANMSG = (37, Warning, true, "No channel id match for search reply; search reply ignored");
    ECA_DLCKREST = (38, Warning, true, "Reseting dead connection; will try to reconnect");
    ECA_SERVBEHIND = (39, Warning, true, "Server (IOC) has fallen behind or is not responding; still waiting");
    ECA_NOCAST = (40, Warning, true, "No internet interface with broadcast available");
    ECA_BADMASK = (41, Error, false, "Invalid event selection mask");
    ECA_IODONE = (42, Info, false, "IO operations have completed");
    ECA_IOINPROGRESS = (43, Info, false, "IO operations are in progress");
    ECA_BADSYNCGRP = (44, Error, false, "Invalid synchronous group identifier");
    ECA_PUTCBINPROG = (45, Error, false, "Put callback timed out");
    ECA_NORDACCESS = (46, Warning, false, "Read access denied");
    ECA_NOWTACCESS = (47, Warning, false, "Write access denied");
    ECA_ANACHRONISM = (48, Error, false, "Requested feature is no longer supported");
    ECA_NOSEARCHADDR = (49, Warning, false, "Empty PV search address list");
    ECA_NOCONVERT = (50, Warning, false, "No reasonable data conversion between client and server types");
    ECA_BADCHID = (51, Error, false, "Invalid channel identifier");
    ECA_BADFUNCPTR = (52, Error, false, "Invalid function pointer");
    ECA_ISATTACHED = (53, Warning, false, "Thread is already attached to a client context");
    ECA_UNAVAILINSERV = (54, Warning, false, "Not supported by attached service");
    ECA_CHANDESTROY = (55, Warning, false, "User destroyed channel");
    ECA_BADPRIORITY = (56, Error, false, "Invalid channel priority");
    ECA_NOTTHREADED = (57, Error, false, "Preemptive callback not enabled - additional threads may not join context");
    ECA_16KARRAYCLIENT = (58, Warning, false, "Client's protocol revision does not support transfers exceeding 16k bytes");
    ECA_CONNSEQTMO = (59, Warning, false, "Virtual circuit connection sequence aborted");
    ECA_UNRESPTMO = (60, Warning, false, "Virtual circuit unresponsive");
}

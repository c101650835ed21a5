//! Split Planner
//!
//! Decides whether a read request is decomposed into time-windowed
//! sub-requests and, if so, builds one [`SubRequest`] per window.
//!
//! Windows are built from the API's configured boundaries with a zero lower
//! bound prepended and the current timestamp appended:
//!
//! ```text
//! boundaries [100, 200], now = 300
//!
//!   0 ────── 100 ────── 200 ────── 300
//!   [ win 0 )[ win 1  )[ win 2   )
//! ```

use std::collections::HashMap;

use crate::config::ApiRedirect;

/// Half-open timestamp range `[lower, upper)` bounding one sub-request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Window {
    /// Inclusive lower bound (seconds)
    pub lower: i64,
    /// Exclusive upper bound (seconds)
    pub upper: i64,
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// Pair consecutive boundaries into contiguous windows covering `[0, now]`
///
/// Always yields `boundaries.len() + 1` windows; an empty boundary list
/// degenerates to the single window `[0, now)`.
#[must_use]
pub fn windows_for(boundaries: &[i64], now: i64) -> Vec<Window> {
    let mut windows = Vec::with_capacity(boundaries.len() + 1);
    let mut prev = 0;
    for &upper in boundaries.iter().chain(std::iter::once(&now)) {
        windows.push(Window { lower: prev, upper });
        prev = upper;
    }
    windows
}

// ============================================================================
// Split Table
// ============================================================================

/// Read-only mapping from API name to ordered boundary timestamps
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitTable {
    apis: HashMap<String, Vec<i64>>,
}

impl SplitTable {
    /// Build the table from configured redirects
    #[must_use]
    pub fn from_redirects(redirects: Vec<ApiRedirect>) -> Self {
        let apis = redirects
            .into_iter()
            .map(|r| (r.api, r.timestamps))
            .collect();
        Self { apis }
    }

    /// Boundaries for an API, if it is configured for splitting
    #[must_use]
    pub fn boundaries(&self, api: &str) -> Option<&[i64]> {
        self.apis.get(api).map(Vec::as_slice)
    }

    /// Number of configured APIs
    #[must_use]
    pub fn len(&self) -> usize {
        self.apis.len()
    }

    /// Whether no API is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

/// Query parameter names used when windowing a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitParams {
    /// Name of the lower-bound parameter (e.g. `min_cdate`)
    pub lower_bound_param: String,
    /// Name of the upper-bound parameter (e.g. `max_cdate`)
    pub upper_bound_param: String,
    /// Keys whose presence means the client supplied its own filter
    pub override_params: Vec<String>,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            lower_bound_param: "min_cdate".into(),
            upper_bound_param: "max_cdate".into(),
            override_params: vec!["create_by".into(), "min_cdate".into(), "max_cdate".into()],
        }
    }
}

// ============================================================================
// Plans
// ============================================================================

/// One outbound request against a single window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubRequest {
    /// Position of this window in the plan
    pub index: usize,
    /// Backend base address
    pub backend: String,
    /// API name
    pub api: String,
    /// The client's original query string (without `?`)
    pub query: String,
    /// Time window bounding this request
    pub window: Window,
    /// Fully-qualified URL to fetch
    pub url: String,
}

/// Ordered sub-requests for one client request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitPlan {
    api: String,
    sub_requests: Vec<SubRequest>,
}

impl SplitPlan {
    /// API name the plan was built for
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Number of windows (and therefore executors)
    #[must_use]
    pub fn len(&self) -> usize {
        self.sub_requests.len()
    }

    /// Never true for a plan built by [`SplitPlanner`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sub_requests.is_empty()
    }

    /// Windows in plan order
    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.sub_requests.iter().map(|s| s.window)
    }

    /// Borrow the sub-requests
    #[must_use]
    pub fn sub_requests(&self) -> &[SubRequest] {
        &self.sub_requests
    }

    /// Consume the plan, yielding its sub-requests
    #[must_use]
    pub fn into_sub_requests(self) -> Vec<SubRequest> {
        self.sub_requests
    }
}

/// Why a request is not split
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassThroughReason {
    /// Path has no usable final segment
    MalformedPath,
    /// API is not in the split table
    UnknownApi,
    /// Client supplied its own creation filter
    ClientOverride,
}

impl std::fmt::Display for PassThroughReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPath => write!(f, "malformed path"),
            Self::UnknownApi => write!(f, "api not configured for splitting"),
            Self::ClientOverride => write!(f, "client supplied creation filter"),
        }
    }
}

/// Outcome of planning
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanDecision {
    /// Forward verbatim
    PassThrough(PassThroughReason),
    /// Fan out over the plan's windows
    Split(SplitPlan),
}

// ============================================================================
// Planner
// ============================================================================

/// Builds split plans from the immutable split table
#[derive(Clone, Debug, Default)]
pub struct SplitPlanner {
    table: SplitTable,
    params: SplitParams,
}

impl SplitPlanner {
    /// Create a planner
    #[must_use]
    pub fn new(table: SplitTable, params: SplitParams) -> Self {
        Self { table, params }
    }

    /// The split table
    #[must_use]
    pub fn table(&self) -> &SplitTable {
        &self.table
    }

    /// The query parameter names
    #[must_use]
    pub fn params(&self) -> &SplitParams {
        &self.params
    }

    /// Plan a request using the current wall-clock time as the final bound
    #[must_use]
    pub fn plan(&self, backend: &str, path: &str, query: Option<&str>) -> PlanDecision {
        self.plan_at(backend, path, query, chrono::Utc::now().timestamp())
    }

    /// Plan a request with an explicit "now"
    #[must_use]
    pub fn plan_at(
        &self,
        backend: &str,
        path: &str,
        query: Option<&str>,
        now: i64,
    ) -> PlanDecision {
        let Some(api) = api_from_path(path) else {
            return PlanDecision::PassThrough(PassThroughReason::MalformedPath);
        };
        let Some(boundaries) = self.table.boundaries(api) else {
            return PlanDecision::PassThrough(PassThroughReason::UnknownApi);
        };

        let query = query.unwrap_or("");
        if has_override(query, &self.params.override_params) {
            return PlanDecision::PassThrough(PassThroughReason::ClientOverride);
        }

        let backend = backend.trim_end_matches('/');
        let sub_requests = windows_for(boundaries, now)
            .into_iter()
            .enumerate()
            .map(|(index, window)| SubRequest {
                index,
                backend: backend.to_string(),
                api: api.to_string(),
                query: query.to_string(),
                url: self.window_url(backend, api, query, window),
                window,
            })
            .collect();

        PlanDecision::Split(SplitPlan {
            api: api.to_string(),
            sub_requests,
        })
    }

    /// `<backend>/<api>?<query>&<lower>=N&<upper>=M`
    fn window_url(&self, backend: &str, api: &str, query: &str, window: Window) -> String {
        let sep = if query.is_empty() { "" } else { "&" };
        format!(
            "{backend}/{api}?{query}{sep}{}={}&{}={}",
            self.params.lower_bound_param,
            window.lower,
            self.params.upper_bound_param,
            window.upper
        )
    }
}

/// Final non-empty path segment, which names the API
#[must_use]
pub fn api_from_path(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

/// Whether any query key matches one of the override parameters
fn has_override(query: &str, override_params: &[String]) -> bool {
    query
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .any(|key| override_params.iter().any(|p| p == key))
}

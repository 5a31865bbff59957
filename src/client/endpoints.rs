//! URL builders for the GitLab REST endpoints the reporter reads.
//!
//! Paged endpoints take the page number last so callers can walk pages
//! with the same base arguments.

use crate::models::{DateRange, ProjectId};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes escaped in user-supplied path segments and query values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Base URL plus the query filters shared by every request of a run.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
    per_page: usize,
}

impl Endpoints {
    pub fn new(base_url: &str, per_page: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            per_page,
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// `GET /projects`
    pub fn projects(&self, page: usize) -> String {
        format!(
            "{}/projects?per_page={}&page={}",
            self.base_url, self.per_page, page
        )
    }

    /// `GET /projects/:id/repository/commits` filtered by author and range.
    pub fn commits_by_author(
        &self,
        project: &ProjectId,
        user_id: &str,
        range: &DateRange,
        page: usize,
    ) -> String {
        format!(
            "{}/projects/{}/repository/commits?author_id={}&since={}&until={}&per_page={}&page={}",
            self.base_url,
            project,
            encode(user_id),
            range.since_param(),
            range.until_param(),
            self.per_page,
            page
        )
    }

    /// `GET /projects/:id/repository/commits` for every author in the range.
    pub fn commits_in_range(&self, project: &ProjectId, range: &DateRange, page: usize) -> String {
        format!(
            "{}/projects/{}/repository/commits?since={}&until={}&per_page={}&page={}",
            self.base_url,
            project,
            range.since_param(),
            range.until_param(),
            self.per_page,
            page
        )
    }

    /// `GET /projects/:id/repository/commits/:sha`
    pub fn commit(&self, project: &ProjectId, sha: &str) -> String {
        format!(
            "{}/projects/{}/repository/commits/{}",
            self.base_url,
            project,
            encode(sha)
        )
    }

    /// `GET /projects/:id/merge_requests?author_id=...`
    ///
    /// The range is only applied when `scope` is given.
    pub fn merge_requests_authored(
        &self,
        project: &ProjectId,
        user_id: &str,
        scope: Option<&DateRange>,
        page: usize,
    ) -> String {
        self.merge_requests(project, "author_id", user_id, scope, page)
    }

    /// `GET /projects/:id/merge_requests?reviewer_id=...`
    pub fn merge_requests_reviewed(
        &self,
        project: &ProjectId,
        user_id: &str,
        scope: Option<&DateRange>,
        page: usize,
    ) -> String {
        self.merge_requests(project, "reviewer_id", user_id, scope, page)
    }

    fn merge_requests(
        &self,
        project: &ProjectId,
        role: &str,
        user_id: &str,
        scope: Option<&DateRange>,
        page: usize,
    ) -> String {
        let mut url = format!(
            "{}/projects/{}/merge_requests?{}={}",
            self.base_url,
            project,
            role,
            encode(user_id)
        );
        if let Some(range) = scope {
            url.push_str(&format!(
                "&updated_after={}&updated_before={}",
                range.since_param(),
                range.until_param()
            ));
        }
        url.push_str(&format!("&per_page={}&page={}", self.per_page, page));
        url
    }
}

//! The three group listings and the sequential run over them.
//!
//! Each listing writes one identifier per line as items arrive, so output
//! produced before a failure stays written.

use std::fmt;
use std::io::Write;

use crate::CoreError;
use crate::auth::{AccessTokenSource, AuthError};
use crate::graph::GraphClient;

/// One of the listings the tool can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// Groups the signed-in user is a member of.
    MyGroupMemberships,
    /// Every group in the organization.
    AllOrgGroups,
    /// Groups of a user; `None` means the signed-in user.
    GroupsForUser(Option<String>),
}

impl Listing {
    /// All three listings in their fixed order.
    #[must_use]
    pub fn all(user: Option<String>) -> Vec<Self> {
        vec![
            Self::MyGroupMemberships,
            Self::AllOrgGroups,
            Self::GroupsForUser(user),
        ]
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MyGroupMemberships => write!(f, "my group memberships"),
            Self::AllOrgGroups => write!(f, "organization groups"),
            Self::GroupsForUser(Some(upn)) => write!(f, "groups of {upn}"),
            Self::GroupsForUser(None) => write!(f, "groups of the signed-in user"),
        }
    }
}

/// Result of one listing within a run.
#[derive(Debug)]
pub struct ListingOutcome {
    /// Which listing ran.
    pub listing: Listing,
    /// Identifiers written, or why the listing failed.
    pub result: Result<usize, CoreError>,
}

/// Outcomes of a run, in execution order.
#[derive(Debug, Default)]
pub struct RunReport {
    /// One entry per attempted listing.
    pub outcomes: Vec<ListingOutcome>,
}

impl RunReport {
    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ListingOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Whether every attempted listing succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

fn write_id<W: Write>(out: &mut W, id: &str) -> Result<(), CoreError> {
    writeln!(out, "{id}")?;
    Ok(())
}

/// Print the ids of the groups the signed-in user belongs to.
///
/// # Errors
///
/// Returns the first token, transport, decoding or write error.
pub async fn write_my_group_memberships<A, W>(
    graph: &GraphClient<A>,
    out: &mut W,
) -> Result<usize, CoreError>
where
    A: AccessTokenSource,
    W: Write,
{
    let count = graph
        .my_member_groups()
        .for_each(|id| write_id(out, &id))
        .await?;
    out.flush()?;
    Ok(count)
}

/// Print the id of every group in the organization.
///
/// # Errors
///
/// Returns the first token, transport, decoding or write error.
pub async fn write_all_org_groups<A, W>(
    graph: &GraphClient<A>,
    out: &mut W,
) -> Result<usize, CoreError>
where
    A: AccessTokenSource,
    W: Write,
{
    let count = graph
        .groups()
        .for_each(|group| {
            log::trace!("group {} ({:?})", group.id, group.display_name);
            write_id(out, &group.id)
        })
        .await?;
    out.flush()?;
    Ok(count)
}

/// Print the ids of everything `user` is a member of.
///
/// With no user, the signed-in user's principal name is looked up first.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the user does not exist, otherwise the
/// first token, transport, decoding or write error.
pub async fn write_groups_for_user<A, W>(
    graph: &GraphClient<A>,
    user: Option<&str>,
    out: &mut W,
) -> Result<usize, CoreError>
where
    A: AccessTokenSource,
    W: Write,
{
    let upn = match user {
        Some(upn) => upn.to_string(),
        None => {
            let me = graph.me().await?;
            log::debug!("signed-in user is {}", me.user_principal_name);
            me.user_principal_name
        }
    };

    let count = graph
        .member_of(&upn)
        .for_each(|object| {
            log::trace!("{upn} member of {} ({:?})", object.id, object.odata_type);
            write_id(out, &object.id)
        })
        .await?;
    out.flush()?;
    Ok(count)
}

/// Run one listing.
///
/// # Errors
///
/// See the individual `write_*` functions.
pub async fn run_listing<A, W>(
    graph: &GraphClient<A>,
    listing: &Listing,
    out: &mut W,
) -> Result<usize, CoreError>
where
    A: AccessTokenSource,
    W: Write,
{
    match listing {
        Listing::MyGroupMemberships => write_my_group_memberships(graph, out).await,
        Listing::AllOrgGroups => write_all_org_groups(graph, out).await,
        Listing::GroupsForUser(user) => write_groups_for_user(graph, user.as_deref(), out).await,
    }
}

/// Run `listings` one after another.
///
/// A failed listing does not stop the next one unless `fail_fast` is set.
/// After a sign-in failure the remaining listings are reported with the same
/// error without prompting again.
pub async fn run_listings<A, W>(
    graph: &GraphClient<A>,
    listings: &[Listing],
    out: &mut W,
    fail_fast: bool,
) -> RunReport
where
    A: AccessTokenSource,
    W: Write,
{
    let mut report = RunReport::default();
    let mut sign_in_failure: Option<AuthError> = None;

    for listing in listings {
        let result = match &sign_in_failure {
            Some(err) => Err(CoreError::Auth(err.clone())),
            None => run_listing(graph, listing, out).await,
        };

        match &result {
            Ok(count) => log::info!("{listing}: {count} identifier(s)"),
            Err(CoreError::Auth(err)) => {
                log::error!("{listing} failed: {err}");
                if sign_in_failure.is_none() {
                    sign_in_failure = Some(err.clone());
                }
            }
            Err(err) => log::error!("{listing} failed: {err}"),
        }

        let failed = result.is_err();
        report.outcomes.push(ListingOutcome {
            listing: listing.clone(),
            result,
        });
        if failed && fail_fast {
            break;
        }
    }

    report
}

//! Project lifecycle use-case service.
//!
//! # Responsibility
//! - Run create/rename/archive/merge/delete/search/export flows over the
//!   project store and session context.
//! - Enforce confirmation gating and in-progress protection.
//! - Translate every result into a [`LifecycleOutcome`].
//!
//! # Invariants
//! - Multi-step writes use versioned expectations; a concurrent writer turns
//!   the flow into a failure instead of a silent overwrite.
//! - Every mutating entry point invalidates the resolver cache on exit,
//!   whatever the result.
//! - Storage errors never escape as `Err`; they become generic failures.

use crate::command::{parse_command, CommandIntent};
use crate::config::SitebookConfig;
use crate::geocode::GeocodingClient;
use crate::model::export::{ProjectExport, TransferError, EXPORT_FORMAT_VERSION};
use crate::model::geo::{CoordinateError, Coordinates};
use crate::model::project::{now_epoch_ms, ProjectRecord, ProjectSummary};
use crate::naming::generator::{extract_location_phrase, normalize_name, CanonicalNameGenerator};
use crate::repo::project_repo::{ExpectedVersion, ProjectStore, RepoResult};
use crate::repo::session_repo::SessionContextStore;
use crate::resolve::resolver::{ProjectReferenceResolver, ResolutionResult};
use crate::service::outcome::{
    DuplicateGroup, DuplicateMatch, LifecycleErrorCode, LifecycleOutcome,
};
use glob::{MatchOptions, Pattern, PatternError};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const LIST_HINT: &str = "Say \"list projects\" to see available names.";

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Input for [`ProjectLifecycleManager::create_project`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateProjectRequest {
    /// Free text the user typed, used for naming.
    pub query: String,
    pub coordinates: Option<Coordinates>,
    /// Explicit name; normalized before use.
    pub name: Option<String>,
}

impl CreateProjectRequest {
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Conjunctive project search filters; `None`/empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSearchFilters {
    /// Case-insensitive substring of the name or location label.
    pub location: Option<String>,
    /// Stages that must all have results.
    pub stages: Vec<String>,
    /// Inclusive lower bound on `created_at` (epoch ms).
    pub created_after: Option<i64>,
    /// Inclusive upper bound on `created_at` (epoch ms).
    pub created_before: Option<i64>,
    pub archived: Option<bool>,
}

impl ProjectSearchFilters {
    pub fn matches(&self, record: &ProjectRecord) -> bool {
        self.matches_location(record)
            && self.stages.iter().all(|stage| record.has_stage(stage))
            && self.created_after.map_or(true, |from| record.created_at >= from)
            && self.created_before.map_or(true, |to| record.created_at <= to)
            && self
                .archived
                .map_or(true, |archived| record.is_archived() == archived)
    }

    fn matches_location(&self, record: &ProjectRecord) -> bool {
        let Some(needle) = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return true;
        };
        let needle = needle.to_lowercase();
        let slug = needle.split_whitespace().collect::<Vec<_>>().join("-");
        let name = record.name.to_lowercase();
        name.contains(&needle)
            || name.contains(&slug)
            || record
                .metadata
                .location
                .as_deref()
                .is_some_and(|label| label.to_lowercase().contains(&needle))
    }
}

/// Lifecycle facade over a project store, a session store and a geocoder.
pub struct ProjectLifecycleManager<S, C, G> {
    store: Arc<S>,
    sessions: Arc<C>,
    resolver: ProjectReferenceResolver<S, C>,
    generator: CanonicalNameGenerator<S, G>,
    config: SitebookConfig,
}

impl<S, C, G> ProjectLifecycleManager<S, C, G>
where
    S: ProjectStore,
    C: SessionContextStore,
    G: GeocodingClient,
{
    pub fn new(store: Arc<S>, sessions: Arc<C>, geocoder: G, config: SitebookConfig) -> Self {
        let resolver =
            ProjectReferenceResolver::new(Arc::clone(&store), Arc::clone(&sessions), &config);
        let generator = CanonicalNameGenerator::new(Arc::clone(&store), geocoder, &config);
        Self {
            store,
            sessions,
            resolver,
            generator,
            config,
        }
    }

    pub fn resolver(&self) -> &ProjectReferenceResolver<S, C> {
        &self.resolver
    }

    pub fn generator(&self) -> &CanonicalNameGenerator<S, G> {
        &self.generator
    }

    pub fn config(&self) -> &SitebookConfig {
        &self.config
    }

    /// Creates a project and makes it the session's active project.
    ///
    /// Nearby projects are reported but never block creation.
    pub fn create_project(
        &self,
        session_id: &str,
        request: &CreateProjectRequest,
    ) -> LifecycleOutcome {
        let subject = request.name.as_deref().unwrap_or(request.query.as_str());
        let result = self.try_create(session_id, request);
        self.finish_mutation("project_create", subject, result)
    }

    /// Lists projects within `radius_km` (default from config) of
    /// `coordinates`, nearest first.
    pub fn check_for_duplicates(
        &self,
        coordinates: Coordinates,
        radius_km: Option<f64>,
    ) -> LifecycleOutcome {
        let subject = format!("{:.4},{:.4}", coordinates.latitude, coordinates.longitude);
        let result = self.try_check_duplicates(coordinates, radius_km);
        self.finish("duplicate_check", &subject, result)
    }

    /// Groups every located project by single-linkage proximity.
    pub fn find_duplicate_groups(&self, radius_km: Option<f64>) -> LifecycleOutcome {
        let result = self.try_duplicate_groups(radius_km);
        self.finish("duplicate_groups", "*", result)
    }

    /// Archives `name`; clears `session_id`'s active pointer when it names
    /// the archived project.
    pub fn archive_project(&self, name: &str, session_id: Option<&str>) -> LifecycleOutcome {
        let result = self.try_archive(name, session_id);
        self.finish_mutation("project_archive", name, result)
    }

    pub fn unarchive_project(&self, name: &str) -> LifecycleOutcome {
        let result = self.try_unarchive(name);
        self.finish_mutation("project_unarchive", name, result)
    }

    /// Moves `old` to the normalized form of `new`, carrying session
    /// references along.
    pub fn rename_project(&self, old: &str, new: &str) -> LifecycleOutcome {
        let result = self.try_rename(old, new);
        self.finish_mutation("project_rename", old, result)
    }

    /// Hard-deletes `name` once `confirmed`.
    pub fn delete_project(&self, name: &str, confirmed: bool) -> LifecycleOutcome {
        let result = self.try_delete(name, confirmed);
        self.finish_mutation("project_delete", name, result)
    }

    /// Deletes every project whose name starts with `pattern`, or matches it
    /// as a glob when it contains `*` or `?`. In-progress matches are
    /// skipped and reported.
    pub fn bulk_delete(&self, pattern: &str, confirmed: bool) -> LifecycleOutcome {
        let result = self.try_bulk_delete(pattern, confirmed);
        self.finish_mutation("project_bulk_delete", pattern, result)
    }

    /// Merges two projects into the one named by `keep`.
    pub fn merge_projects(&self, first: &str, second: &str, keep: Option<&str>) -> LifecycleOutcome {
        let subject = format!("{first}+{second}");
        let result = self.try_merge(first, second, keep);
        self.finish_mutation("project_merge", &subject, result)
    }

    pub fn search_projects(&self, filters: &ProjectSearchFilters) -> LifecycleOutcome {
        let result = self.try_search(filters);
        self.finish("project_search", "*", result)
    }

    pub fn list_projects(&self, include_archived: bool) -> LifecycleOutcome {
        let result = self.try_list(include_archived);
        self.finish("project_list", "*", result)
    }

    /// Wraps `name` in a versioned export document.
    pub fn export_project(&self, name: &str) -> LifecycleOutcome {
        let result = self.try_export(name);
        self.finish("project_export", name, result)
    }

    /// Stores a project from an export document, renaming it when its name
    /// is taken.
    pub fn import_project(&self, payload: &str) -> LifecycleOutcome {
        let result = self.try_import(payload);
        self.finish_mutation("project_import", "payload", result)
    }

    /// Resolves `query` against the session and the store.
    pub fn resolve_reference(&self, session_id: &str, query: &str) -> LifecycleOutcome {
        let result = self
            .resolver
            .resolve(session_id, query)
            .map(|resolution| resolution_outcome(query, resolution));
        self.finish("project_resolve", session_id, result)
    }

    /// Parses a free-text lifecycle command and dispatches it.
    pub fn handle_command(&self, session_id: &str, text: &str, confirmed: bool) -> LifecycleOutcome {
        let Some(intent) = parse_command(text) else {
            info!("event=command module=lifecycle status=unrecognized session={session_id}");
            return LifecycleOutcome::generic_failure(
                "I didn't recognise that as a project command. Try \"list projects\" to see what you have.",
            );
        };

        match intent {
            CommandIntent::List { include_archived } => self.list_projects(include_archived),
            CommandIntent::FindDuplicates => self.find_duplicate_groups(None),
            CommandIntent::BulkDelete { pattern } => self.bulk_delete(&pattern, confirmed),
            CommandIntent::Delete { target } => self.with_target(session_id, &target, |name| {
                self.delete_project(name, confirmed)
            }),
            CommandIntent::Rename { target, new_name } => {
                self.with_target(session_id, &target, |name| self.rename_project(name, &new_name))
            }
            CommandIntent::Archive { target } => self.with_target(session_id, &target, |name| {
                self.archive_project(name, Some(session_id))
            }),
            CommandIntent::Unarchive { target } => {
                self.with_target(session_id, &target, |name| self.unarchive_project(name))
            }
            CommandIntent::Export { target } => {
                self.with_target(session_id, &target, |name| self.export_project(name))
            }
            CommandIntent::Merge {
                first,
                second,
                keep,
            } => self.with_target(session_id, &first, |first| {
                self.with_target(session_id, &second, |second| {
                    self.merge_projects(first, second, keep.as_deref())
                })
            }),
        }
    }

    fn with_target(
        &self,
        session_id: &str,
        fragment: &str,
        action: impl FnOnce(&str) -> LifecycleOutcome,
    ) -> LifecycleOutcome {
        match self.resolver.resolve_fragment(session_id, fragment) {
            Ok(resolution) => match resolution.name.clone() {
                Some(name) if !resolution.is_ambiguous => action(&name),
                _ => resolution_outcome(fragment, resolution),
            },
            Err(err) => self.finish("command_resolve", fragment, Err(err)),
        }
    }

    fn try_create(
        &self,
        session_id: &str,
        request: &CreateProjectRequest,
    ) -> RepoResult<LifecycleOutcome> {
        if let Some(coordinates) = request.coordinates {
            if let Err(err) = coordinates.validate() {
                return Ok(invalid_coordinates(&err));
            }
        }

        let (name, location) = match request.name.as_deref() {
            Some(requested) => {
                let name = self.generator.normalize(requested);
                if name.is_empty() {
                    return Ok(unusable_name(requested));
                }
                if self.store.load_project(&name)?.is_some() {
                    return Ok(name_taken(&name));
                }
                (name, extract_location_phrase(&request.query))
            }
            None => {
                let generated = self
                    .generator
                    .generate_from_query(&request.query, request.coordinates);
                (generated.name, generated.location)
            }
        };

        let duplicates = match request.coordinates {
            Some(coordinates) => {
                self.duplicates_near(coordinates, self.config.duplicate_radius_km)?
            }
            None => Vec::new(),
        };

        let mut record = ProjectRecord::new(name, request.coordinates);
        record.metadata.location = location;
        record.version = self.store.save_project(&record, ExpectedVersion::Absent)?;
        self.sessions.append_history(session_id, &record.name)?;
        self.sessions.set_active_project(session_id, &record.name)?;

        let mut message = format!("Created project `{}`.", record.name);
        if !duplicates.is_empty() {
            message.push_str(&format!(
                " Existing projects within {} km: {}. Merge them if they are the same site.",
                self.config.duplicate_radius_km,
                describe_matches(&duplicates)
            ));
        }
        let summary = ProjectSummary::from(&record);
        Ok(LifecycleOutcome::success(message).with(|payload| {
            payload.project = Some(summary);
            payload.duplicates = duplicates;
        }))
    }

    fn try_check_duplicates(
        &self,
        coordinates: Coordinates,
        radius_km: Option<f64>,
    ) -> RepoResult<LifecycleOutcome> {
        if let Err(err) = coordinates.validate() {
            return Ok(invalid_coordinates(&err));
        }
        let radius = match self.effective_radius(radius_km) {
            Ok(radius) => radius,
            Err(outcome) => return Ok(outcome),
        };

        let matches = self.duplicates_near(coordinates, radius)?;
        let message = if matches.is_empty() {
            format!("No existing projects within {radius} km.")
        } else {
            format!(
                "Found {} project(s) within {radius} km: {}.",
                matches.len(),
                describe_matches(&matches)
            )
        };
        Ok(LifecycleOutcome::success(message).with(|payload| payload.duplicates = matches))
    }

    fn try_duplicate_groups(&self, radius_km: Option<f64>) -> RepoResult<LifecycleOutcome> {
        let radius = match self.effective_radius(radius_km) {
            Ok(radius) => radius,
            Err(outcome) => return Ok(outcome),
        };

        let located = self
            .store
            .list_projects()?
            .into_iter()
            .filter_map(|record| record.coordinates.map(|point| (record.name, point)))
            .collect::<Vec<_>>();
        let groups = single_linkage_groups(&located, radius);

        let message = if groups.is_empty() {
            format!("No projects lie within {radius} km of each other.")
        } else {
            let described = groups
                .iter()
                .map(|group| {
                    group
                        .members
                        .iter()
                        .map(|member| member.name.as_str())
                        .collect::<Vec<_>>()
                        .join(" + ")
                })
                .collect::<Vec<_>>()
                .join("; ");
            format!(
                "Found {} group(s) of possible duplicates within {radius} km: {described}. Merge the ones that are the same site.",
                groups.len()
            )
        };
        Ok(LifecycleOutcome::success(message).with(|payload| payload.duplicate_groups = groups))
    }

    fn try_archive(&self, name: &str, session_id: Option<&str>) -> RepoResult<LifecycleOutcome> {
        let Some(mut record) = self.store.load_project(name)? else {
            return Ok(not_found(name));
        };
        if record.is_in_progress() {
            return Ok(in_progress(&record.name));
        }
        if record.is_archived() {
            let message = format!(
                "Project `{0}` is already archived. Say \"unarchive project {0}\" to restore it.",
                record.name
            );
            return Ok(with_summary(LifecycleOutcome::success(message), &record));
        }

        let expected = ExpectedVersion::Exactly(record.version);
        record.archive(now_epoch_ms());
        record.version = self.store.save_project(&record, expected)?;

        if let Some(session_id) = session_id {
            if self.sessions.active_project(session_id)?.as_deref() == Some(record.name.as_str()) {
                self.sessions.set_active_project(session_id, "")?;
            }
        }

        let message = format!(
            "Archived project `{0}`. Say \"unarchive project {0}\" to restore it.",
            record.name
        );
        Ok(with_summary(LifecycleOutcome::success(message), &record))
    }

    fn try_unarchive(&self, name: &str) -> RepoResult<LifecycleOutcome> {
        let Some(mut record) = self.store.load_project(name)? else {
            return Ok(not_found(name));
        };
        if !record.is_archived() {
            let message = format!("Project `{}` is not archived; nothing to restore.", record.name);
            return Ok(with_summary(LifecycleOutcome::success(message), &record));
        }

        let expected = ExpectedVersion::Exactly(record.version);
        record.unarchive(now_epoch_ms());
        record.version = self.store.save_project(&record, expected)?;

        let message = format!("Restored project `{}` from the archive.", record.name);
        Ok(with_summary(LifecycleOutcome::success(message), &record))
    }

    fn try_rename(&self, old: &str, new: &str) -> RepoResult<LifecycleOutcome> {
        let Some(record) = self.store.load_project(old)? else {
            return Ok(not_found(old));
        };
        let new_name = self.generator.normalize(new);
        if new_name.is_empty() {
            return Ok(unusable_name(new));
        }
        if new_name == record.name {
            let message = format!("Project is already named `{new_name}`.");
            return Ok(with_summary(LifecycleOutcome::success(message), &record));
        }
        if self.store.load_project(&new_name)?.is_some() {
            return Ok(name_taken(&new_name));
        }
        if record.is_in_progress() {
            return Ok(in_progress(&record.name));
        }

        let mut renamed = record.clone();
        renamed.name = new_name.clone();
        renamed.updated_at = now_epoch_ms();
        let new_version = self.store.save_project(&renamed, ExpectedVersion::Absent)?;
        if let Err(err) = self
            .store
            .delete_project(&record.name, ExpectedVersion::Exactly(record.version))
        {
            if let Err(rollback) = self
                .store
                .delete_project(&new_name, ExpectedVersion::Exactly(new_version))
            {
                warn!(
                    "event=project_rename module=lifecycle status=rollback_failed old={} new={} error={}",
                    record.name, new_name, rollback
                );
            }
            return Err(err);
        }
        renamed.version = new_version;

        let moved = self
            .sessions
            .replace_project_references(&record.name, &new_name)?;
        info!(
            "event=project_rename module=lifecycle status=references_moved old={} new={} sessions={}",
            record.name, new_name, moved
        );

        let message = format!("Renamed project `{}` to `{}`.", record.name, new_name);
        Ok(with_summary(LifecycleOutcome::success(message), &renamed))
    }

    fn try_delete(&self, name: &str, confirmed: bool) -> RepoResult<LifecycleOutcome> {
        let Some(record) = self.store.load_project(name)? else {
            return Ok(not_found(name));
        };
        if record.is_in_progress() {
            return Ok(in_progress(&record.name));
        }
        if !confirmed {
            let message = format!(
                "Delete project `{}` and its {} stage result(s)? This cannot be undone. Repeat the command with confirmation to proceed.",
                record.name,
                record.results.len()
            );
            return Ok(with_summary(
                LifecycleOutcome::confirmation_required(message),
                &record,
            ));
        }

        self.store
            .delete_project(&record.name, ExpectedVersion::Exactly(record.version))?;
        self.sessions.forget_project(&record.name)?;

        let message = format!("Deleted project `{}`.", record.name);
        Ok(LifecycleOutcome::success(message).with(|payload| payload.deleted = vec![record.name]))
    }

    fn try_bulk_delete(&self, pattern: &str, confirmed: bool) -> RepoResult<LifecycleOutcome> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(LifecycleOutcome::generic_failure(
                "Provide a name prefix or a glob pattern such as `test-*`.",
            ));
        }
        let filter = match NameFilter::parse(pattern) {
            Ok(filter) => filter,
            Err(err) => {
                return Ok(LifecycleOutcome::generic_failure(format!(
                    "`{pattern}` is not a valid pattern: {err}. Use * and ? as wildcards."
                )))
            }
        };

        let matches = self
            .store
            .list_projects()?
            .into_iter()
            .filter(|record| filter.matches(&record.name))
            .collect::<Vec<_>>();
        if matches.is_empty() {
            return Ok(LifecycleOutcome::failure(
                LifecycleErrorCode::ProjectNotFound,
                format!("No projects match `{pattern}`. {LIST_HINT}"),
            ));
        }

        let (busy, deletable): (Vec<_>, Vec<_>) =
            matches.into_iter().partition(ProjectRecord::is_in_progress);
        let skipped = busy.into_iter().map(|record| record.name).collect::<Vec<_>>();
        if deletable.is_empty() {
            let message = format!(
                "Every project matching `{pattern}` is still being processed ({}). Wait for the analyses to finish, then try again.",
                skipped.join(", ")
            );
            return Ok(
                LifecycleOutcome::failure(LifecycleErrorCode::ProjectInProgress, message)
                    .with(|payload| payload.skipped = skipped),
            );
        }

        if !confirmed {
            let names = deletable
                .iter()
                .map(|record| record.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let mut message = format!(
                "Delete {} project(s) matching `{pattern}`: {names}? This cannot be undone. Repeat the command with confirmation to proceed.",
                deletable.len()
            );
            push_skipped_note(&mut message, &skipped);
            let summaries = deletable.iter().map(ProjectSummary::from).collect::<Vec<_>>();
            return Ok(
                LifecycleOutcome::confirmation_required(message).with(|payload| {
                    payload.projects = summaries;
                    payload.skipped = skipped;
                }),
            );
        }

        let mut deleted = Vec::with_capacity(deletable.len());
        for record in deletable {
            let removed = self
                .store
                .delete_project(&record.name, ExpectedVersion::Exactly(record.version))
                .and_then(|_| self.sessions.forget_project(&record.name));
            if let Err(err) = removed {
                error!(
                    "event=project_bulk_delete module=lifecycle status=partial failed={} deleted={} error={}",
                    record.name,
                    deleted.len(),
                    err
                );
                let done = if deleted.is_empty() {
                    "none".to_string()
                } else {
                    deleted.join(", ")
                };
                let message = format!(
                    "Storage error while deleting `{}`: {err}. Already deleted: {done}. Retry the command to remove the rest.",
                    record.name
                );
                return Ok(LifecycleOutcome::generic_failure(message).with(|payload| {
                    payload.deleted = deleted;
                    payload.skipped = skipped;
                }));
            }
            deleted.push(record.name);
        }

        let mut message = format!("Deleted {} project(s): {}.", deleted.len(), deleted.join(", "));
        push_skipped_note(&mut message, &skipped);
        Ok(LifecycleOutcome::success(message).with(|payload| {
            payload.deleted = deleted;
            payload.skipped = skipped;
        }))
    }

    fn try_merge(
        &self,
        first: &str,
        second: &str,
        keep: Option<&str>,
    ) -> RepoResult<LifecycleOutcome> {
        let Some(first) = self.store.load_project(first)? else {
            return Ok(not_found(first));
        };
        let Some(second) = self.store.load_project(second)? else {
            return Ok(not_found(second));
        };
        if first.name == second.name || first.id == second.id {
            return Ok(LifecycleOutcome::failure(
                LifecycleErrorCode::InvalidKeepName,
                format!(
                    "Cannot merge project `{}` with itself. Name two different projects.",
                    first.name
                ),
            ));
        }

        let Some(keep) = keep.map(str::trim).filter(|value| !value.is_empty()) else {
            let message = format!(
                "Which name should the merged project keep: `{}` or `{}`? Repeat the command with the name to keep.",
                first.name, second.name
            );
            return Ok(LifecycleOutcome::name_choice_required(
                message,
                vec![first.name, second.name],
            ));
        };

        let keep_first = if self.names_match(keep, &first.name) {
            true
        } else if self.names_match(keep, &second.name) {
            false
        } else {
            return Ok(LifecycleOutcome::failure(
                LifecycleErrorCode::InvalidKeepName,
                format!(
                    "`{keep}` is not one of the merged projects. Keep either `{}` or `{}`.",
                    first.name, second.name
                ),
            ));
        };

        for record in [&first, &second] {
            if record.is_in_progress() {
                return Ok(in_progress(&record.name));
            }
        }

        let (mut kept, other) = if keep_first {
            (first, second)
        } else {
            (second, first)
        };
        let original = kept.clone();
        kept.absorb(&other);
        kept.updated_at = now_epoch_ms();
        let merged_version = self
            .store
            .save_project(&kept, ExpectedVersion::Exactly(original.version))?;
        if let Err(err) = self
            .store
            .delete_project(&other.name, ExpectedVersion::Exactly(other.version))
        {
            if let Err(restore) = self
                .store
                .save_project(&original, ExpectedVersion::Exactly(merged_version))
            {
                warn!(
                    "event=project_merge module=lifecycle status=restore_failed kept={} error={}",
                    kept.name, restore
                );
            }
            return Err(err);
        }
        kept.version = merged_version;
        self.sessions
            .replace_project_references(&other.name, &kept.name)?;

        let message = format!(
            "Merged `{}` into `{}`; {} stage result(s) kept.",
            other.name,
            kept.name,
            kept.results.len()
        );
        Ok(with_summary(LifecycleOutcome::success(message), &kept)
            .with(|payload| payload.merged = vec![other.name]))
    }

    fn try_search(&self, filters: &ProjectSearchFilters) -> RepoResult<LifecycleOutcome> {
        let projects = self
            .store
            .list_projects()?
            .iter()
            .filter(|record| filters.matches(record))
            .map(ProjectSummary::from)
            .collect::<Vec<_>>();
        let message = if projects.is_empty() {
            format!("No projects match those filters. {LIST_HINT}")
        } else {
            format!("Found {} matching project(s).", projects.len())
        };
        Ok(LifecycleOutcome::success(message).with(|payload| payload.projects = projects))
    }

    fn try_list(&self, include_archived: bool) -> RepoResult<LifecycleOutcome> {
        let projects = self
            .store
            .list_projects()?
            .iter()
            .filter(|record| include_archived || !record.is_archived())
            .map(ProjectSummary::from)
            .collect::<Vec<_>>();
        let message = if projects.is_empty() && include_archived {
            "No projects yet. Say \"create a project in <place>\" to start.".to_string()
        } else if projects.is_empty() {
            "No active projects. Say \"list projects including archived\" to see archived ones."
                .to_string()
        } else {
            let names = projects
                .iter()
                .map(|summary| summary.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("You have {} project(s): {names}.", projects.len())
        };
        Ok(LifecycleOutcome::success(message).with(|payload| payload.projects = projects))
    }

    fn try_export(&self, name: &str) -> RepoResult<LifecycleOutcome> {
        let Some(record) = self.store.load_project(name)? else {
            return Ok(not_found(name));
        };
        let message = format!(
            "Exported project `{}` as {EXPORT_FORMAT_VERSION}.",
            record.name
        );
        let summary = ProjectSummary::from(&record);
        let document = ProjectExport::new(record);
        Ok(LifecycleOutcome::success(message).with(|payload| {
            payload.project = Some(summary);
            payload.export = Some(document);
        }))
    }

    fn try_import(&self, payload: &str) -> RepoResult<LifecycleOutcome> {
        let document = match ProjectExport::from_json(payload) {
            Ok(document) => document,
            Err(TransferError::UnsupportedVersion(version)) => {
                return Ok(LifecycleOutcome::failure(
                    LifecycleErrorCode::UnsupportedVersion,
                    format!(
                        "Export format `{version}` is not supported. Re-export the project as {EXPORT_FORMAT_VERSION}."
                    ),
                ))
            }
            Err(err) => {
                return Ok(LifecycleOutcome::generic_failure(format!(
                    "Could not read the import payload: {err}. Provide an unmodified {EXPORT_FORMAT_VERSION} export."
                )))
            }
        };

        let mut record = document.project;
        if let Some(coordinates) = record.coordinates {
            if let Err(err) = coordinates.validate() {
                return Ok(invalid_coordinates(&err));
            }
        }

        // Importing next to the source project yields a separate project.
        if self
            .store
            .list_projects()?
            .iter()
            .any(|existing| existing.id == record.id)
        {
            record.id = Uuid::new_v4();
        }

        let original_name = record.name.clone();
        let mut base = self.generator.normalize(&original_name);
        if base.is_empty() {
            base = self.generator.normalize("imported-project");
        }
        record.name = self.generator.ensure_unique(&base);
        record.updated_at = now_epoch_ms();
        record.version = self.store.save_project(&record, ExpectedVersion::Absent)?;

        let message = if record.name == original_name {
            format!("Imported project `{}`.", record.name)
        } else {
            format!(
                "Imported project `{original_name}` as `{}` because that name was taken or not canonical.",
                record.name
            )
        };
        Ok(with_summary(LifecycleOutcome::success(message), &record))
    }

    fn duplicates_near(
        &self,
        probe: Coordinates,
        radius_km: f64,
    ) -> RepoResult<Vec<DuplicateMatch>> {
        let mut matches = self
            .store
            .list_projects()?
            .into_iter()
            .filter_map(|record| {
                let distance_km = record.coordinates?.distance_km(&probe);
                (distance_km <= radius_km).then_some(DuplicateMatch {
                    name: record.name,
                    distance_km,
                })
            })
            .collect::<Vec<_>>();
        matches.sort_by(|left, right| {
            left.distance_km
                .total_cmp(&right.distance_km)
                .then_with(|| left.name.cmp(&right.name))
        });
        Ok(matches)
    }

    fn effective_radius(&self, radius_km: Option<f64>) -> Result<f64, LifecycleOutcome> {
        let radius = radius_km.unwrap_or(self.config.duplicate_radius_km);
        if radius.is_finite() && radius >= 0.0 {
            Ok(radius)
        } else {
            Err(LifecycleOutcome::generic_failure(format!(
                "Search radius {radius} is invalid. Use a non-negative number of kilometres."
            )))
        }
    }

    fn names_match(&self, typed: &str, name: &str) -> bool {
        typed.eq_ignore_ascii_case(name) || normalize_name(typed, &self.config.name_suffix) == name
    }

    /// Single invalidation point for caches derived from the store.
    fn invalidate(&self) {
        self.resolver.clear_cache();
    }

    fn finish_mutation(
        &self,
        event: &str,
        subject: &str,
        result: RepoResult<LifecycleOutcome>,
    ) -> LifecycleOutcome {
        self.invalidate();
        self.finish(event, subject, result)
    }

    fn finish(
        &self,
        event: &str,
        subject: &str,
        result: RepoResult<LifecycleOutcome>,
    ) -> LifecycleOutcome {
        match result {
            Ok(outcome) => {
                info!(
                    "event={} module=lifecycle status={} subject={}",
                    event,
                    outcome.status_label(),
                    subject
                );
                outcome
            }
            Err(err) => {
                error!(
                    "event={} module=lifecycle status=error subject={} error={}",
                    event, subject, err
                );
                LifecycleOutcome::generic_failure(format!(
                    "Storage error while handling `{subject}`: {err}. Retry the command. {LIST_HINT}"
                ))
            }
        }
    }
}

enum NameFilter {
    Prefix(String),
    Glob(Pattern),
}

impl NameFilter {
    fn parse(pattern: &str) -> Result<Self, PatternError> {
        let lowered = pattern.to_lowercase();
        if lowered.contains(['*', '?']) {
            Ok(Self::Glob(Pattern::new(&lowered)?))
        } else {
            Ok(Self::Prefix(lowered))
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.to_lowercase().starts_with(prefix.as_str()),
            Self::Glob(pattern) => pattern.matches_with(name, GLOB_OPTIONS),
        }
    }
}

/// Connected components of the "within `radius_km`" graph, size two or more.
fn single_linkage_groups(points: &[(String, Coordinates)], radius_km: f64) -> Vec<DuplicateGroup> {
    let mut parent = (0..points.len()).collect::<Vec<_>>();
    let mut nearest = vec![f64::INFINITY; points.len()];

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let distance = points[i].1.distance_km(&points[j].1);
            if distance > radius_km {
                continue;
            }
            nearest[i] = nearest[i].min(distance);
            nearest[j] = nearest[j].min(distance);
            let (root_i, root_j) = (find_root(&mut parent, i), find_root(&mut parent, j));
            if root_i != root_j {
                parent[root_j] = root_i;
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..points.len() {
        let root = find_root(&mut parent, index);
        components.entry(root).or_default().push(index);
    }

    let mut groups = components
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| {
            let mut members = members
                .into_iter()
                .map(|index| DuplicateMatch {
                    name: points[index].0.clone(),
                    distance_km: nearest[index],
                })
                .collect::<Vec<_>>();
            members.sort_by(|left, right| left.name.cmp(&right.name));
            DuplicateGroup { members }
        })
        .collect::<Vec<_>>();
    groups.sort_by(|left, right| left.members[0].name.cmp(&right.members[0].name));
    groups
}

fn find_root(parent: &mut [usize], mut index: usize) -> usize {
    while parent[index] != index {
        parent[index] = parent[parent[index]];
        index = parent[index];
    }
    index
}

fn resolution_outcome(query: &str, resolution: ResolutionResult) -> LifecycleOutcome {
    if resolution.is_ambiguous {
        let message = format!(
            "`{query}` could refer to {}. Say which project you mean.",
            resolution.candidates.join(" or ")
        );
        let candidates = resolution.candidates.clone();
        return LifecycleOutcome::generic_failure(message).with(|payload| {
            payload.candidates = candidates;
            payload.resolution = Some(resolution);
        });
    }
    match resolution.name.clone() {
        Some(name) => LifecycleOutcome::success(format!(
            "Using project `{name}` ({} match).",
            resolution.confidence.as_str()
        ))
        .with(|payload| payload.resolution = Some(resolution)),
        None => LifecycleOutcome::failure(
            LifecycleErrorCode::ProjectNotFound,
            format!("No project matches `{query}`. {LIST_HINT}"),
        )
        .with(|payload| payload.resolution = Some(resolution)),
    }
}

fn with_summary(outcome: LifecycleOutcome, record: &ProjectRecord) -> LifecycleOutcome {
    let summary = ProjectSummary::from(record);
    outcome.with(|payload| payload.project = Some(summary))
}

fn describe_matches(matches: &[DuplicateMatch]) -> String {
    matches
        .iter()
        .map(|found| format!("{} ({:.1} km)", found.name, found.distance_km))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_skipped_note(message: &mut String, skipped: &[String]) {
    if !skipped.is_empty() {
        message.push_str(&format!(
            " Skipped in-progress project(s): {}.",
            skipped.join(", ")
        ));
    }
}

fn not_found(name: &str) -> LifecycleOutcome {
    LifecycleOutcome::failure(
        LifecycleErrorCode::ProjectNotFound,
        format!("Project `{name}` not found. {LIST_HINT}"),
    )
}

fn name_taken(name: &str) -> LifecycleOutcome {
    LifecycleOutcome::failure(
        LifecycleErrorCode::NameAlreadyExists,
        format!(
            "A project named `{name}` already exists. Choose another name, or rename or delete the existing project first."
        ),
    )
}

fn in_progress(name: &str) -> LifecycleOutcome {
    LifecycleOutcome::failure(
        LifecycleErrorCode::ProjectInProgress,
        format!(
            "Project `{name}` is still being processed by an analysis run. Wait for it to finish, then try again."
        ),
    )
}

fn invalid_coordinates(err: &CoordinateError) -> LifecycleOutcome {
    LifecycleOutcome::failure(
        LifecycleErrorCode::InvalidCoordinates,
        format!(
            "Invalid coordinates: {err}. Provide latitude in [-90, 90] and longitude in [-180, 180]."
        ),
    )
}

fn unusable_name(requested: &str) -> LifecycleOutcome {
    LifecycleOutcome::generic_failure(format!(
        "`{requested}` has no usable characters for a project name. Use letters or digits."
    ))
}

#[cfg(test)]
mod tests {
    use super::{single_linkage_groups, NameFilter, ProjectSearchFilters};
    use crate::model::geo::Coordinates;
    use crate::model::project::ProjectRecord;
    use serde_json::json;

    #[test]
    fn name_filter_uses_prefix_without_wildcards() {
        let filter = NameFilter::parse("Test").expect("prefix");
        assert!(filter.matches("test-a-wind-farm"));
        assert!(!filter.matches("contest-wind-farm"));
    }

    #[test]
    fn name_filter_globs_case_insensitively() {
        let filter = NameFilter::parse("*-TX-*").expect("glob");
        assert!(filter.matches("amarillo-tx-wind-farm"));
        assert!(!filter.matches("lubbock-wind-farm"));
        let single = NameFilter::parse("site-?-wind-farm").expect("glob");
        assert!(single.matches("site-a-wind-farm"));
        assert!(!single.matches("site-ab-wind-farm"));
    }

    #[test]
    fn single_linkage_chains_through_intermediate_points() {
        // ~3.3 km steps along a meridian; ends are ~6.7 km apart.
        let points = vec![
            ("a".to_string(), Coordinates::new(35.00, -101.0)),
            ("b".to_string(), Coordinates::new(35.03, -101.0)),
            ("c".to_string(), Coordinates::new(35.06, -101.0)),
            ("far".to_string(), Coordinates::new(40.0, -101.0)),
        ];
        let groups = single_linkage_groups(&points, 5.0);
        assert_eq!(groups.len(), 1);
        let names = groups[0]
            .members
            .iter()
            .map(|member| member.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(groups[0].members.iter().all(|member| member.distance_km < 5.0));
    }

    #[test]
    fn search_filters_compose_conjunctively() {
        let mut record = ProjectRecord::new("amarillo-tx-wind-farm", None);
        record.metadata.location = Some("Amarillo TX".into());
        record.results.insert("terrain".into(), json!({}));

        let by_location = ProjectSearchFilters {
            location: Some("amarillo tx".into()),
            ..ProjectSearchFilters::default()
        };
        assert!(by_location.matches(&record));

        let needs_layout = ProjectSearchFilters {
            location: Some("amarillo".into()),
            stages: vec!["layout".into()],
            ..ProjectSearchFilters::default()
        };
        assert!(!needs_layout.matches(&record));

        let archived_only = ProjectSearchFilters {
            archived: Some(true),
            ..ProjectSearchFilters::default()
        };
        assert!(!archived_only.matches(&record));
        assert!(ProjectSearchFilters::default().matches(&record));
    }
}

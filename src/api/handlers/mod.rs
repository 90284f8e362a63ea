use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::calc::{recompute_project, CalcError, FieldMap, FieldSet, StepDefinition, StepId};
use crate::db::Database;
use crate::models::*;
use crate::numeric;

type ApiError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
///
/// Missing-entity errors raised by the store are passed through as 404s;
/// anything else is logged in full and reported generically.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    let msg = e.to_string();

    if msg.contains("not found") {
        tracing::warn!("Lookup failed: {}", msg);
        return (StatusCode::NOT_FOUND, msg);
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Map a form-layer error to a client error.
fn calc_error(e: CalcError) -> ApiError {
    tracing::warn!("Validation error: {}", e);
    match e {
        CalcError::UnknownStep(_) => (StatusCode::NOT_FOUND, e.to_string()),
        _ => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn parse_step(raw: &str) -> Result<StepId, ApiError> {
    StepId::parse(raw).map_err(calc_error)
}

fn require_project(db: &Database, id: Uuid) -> Result<Project, ApiError> {
    db.get_project(id)
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
}

// ============================================================
// Step helpers
// ============================================================

/// Editable inputs of saved records, one form per step.
fn forms_of(records: &[StepRecord]) -> BTreeMap<StepId, FieldMap> {
    records
        .iter()
        .map(|record| {
            let form = FieldSet::restore(record.step, &record.values);
            (record.step, form.fields)
        })
        .collect()
}

fn saved_inputs(db: &Database, project_id: Uuid) -> Result<BTreeMap<StepId, FieldMap>, ApiError> {
    let records = db.get_step_records(project_id).map_err(internal_error)?;
    Ok(forms_of(&records))
}

fn step_response(record: &StepRecord, fields: FieldMap) -> StepResponse {
    StepResponse {
        project_id: record.project_id,
        step: record.step,
        number: record.step.number(),
        title: record.step.title().to_string(),
        fields,
        updated_at: record.updated_at,
    }
}

/// Apply `edits` on top of the stored steps, recompute the project and
/// persist every saved step from `from` on.
///
/// Later steps read earlier ones, so a change to one step refreshes the
/// stored derived values of everything downstream. The read and the write
/// happen in one store transaction, so concurrent saves never resurrect
/// each other's stale inputs.
fn cascade(
    db: &Database,
    project_id: Uuid,
    from: StepId,
    remove: Option<StepId>,
    edits: BTreeMap<StepId, FieldMap>,
) -> Result<Vec<StepResponse>, ApiError> {
    let mut computed = BTreeMap::new();

    let records = db
        .rewrite_step_records(project_id, remove, |current| {
            let mut inputs = forms_of(current);
            inputs.extend(edits);
            computed = recompute_project(&inputs);

            computed
                .iter()
                .filter(|(step, _)| **step >= from)
                .map(|(step, fields)| {
                    let set = FieldSet {
                        step: *step,
                        fields: fields.clone(),
                    };
                    (*step, set.to_values())
                })
                .collect()
        })
        .map_err(internal_error)?;

    Ok(records
        .iter()
        .filter_map(|record| {
            computed
                .get(&record.step)
                .map(|fields| step_response(record, fields.clone()))
        })
        .collect())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(db): State<Database>) -> Result<Json<Vec<Project>>, ApiError> {
    db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectWithSteps>, ApiError> {
    db.get_project_with_steps(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if input.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Project name must not be empty".to_string(),
        ));
    }

    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn update_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<Project>, ApiError> {
    db.update_project(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
}

pub async fn delete_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if db.delete_project(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Project not found".to_string()))
    }
}

// ============================================================
// Project steps
// ============================================================

/// All saved steps of a project, recomputed in form order.
pub async fn list_project_steps(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StepResponse>>, ApiError> {
    require_project(&db, id)?;

    let records = db.get_step_records(id).map_err(internal_error)?;
    let mut computed = recompute_project(&forms_of(&records));

    Ok(Json(
        records
            .iter()
            .filter_map(|record| {
                computed
                    .remove(&record.step)
                    .map(|fields| step_response(record, fields))
            })
            .collect(),
    ))
}

pub async fn get_project_step(
    State(db): State<Database>,
    Path((id, step)): Path<(Uuid, String)>,
) -> Result<Json<StepResponse>, ApiError> {
    let step = parse_step(&step)?;
    require_project(&db, id)?;

    let record = db
        .get_step_record(id, step)
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "Step record not found".to_string()))?;

    let inputs = saved_inputs(&db, id)?;
    let fields = recompute_project(&inputs)
        .remove(&step)
        .unwrap_or_default();

    Ok(Json(step_response(&record, fields)))
}

/// Save one step, recomputing it and every saved step after it.
pub async fn save_project_step(
    State(db): State<Database>,
    Path((id, step)): Path<(Uuid, String)>,
    Json(input): Json<SaveStepInput>,
) -> Result<Json<StepResponse>, ApiError> {
    let step = parse_step(&step)?;
    let form = FieldSet::from_values(step, &input.values).map_err(calc_error)?;

    let saved = cascade(&db, id, step, None, BTreeMap::from([(step, form.fields)]))?;
    tracing::info!(project_id = %id, step = %step, refreshed = saved.len(), "Saved step");

    saved
        .into_iter()
        .find(|response| response.step == step)
        .map(Json)
        .ok_or_else(|| internal_error("Saved step missing from store"))
}

/// Save several steps at once.
pub async fn bulk_save_project_steps(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<BulkSaveStepsInput>,
) -> Result<(StatusCode, Json<Vec<StepResponse>>), ApiError> {
    require_project(&db, id)?;

    let mut edits = BTreeMap::new();
    for entry in &input.steps {
        let form = FieldSet::from_values(entry.step, &entry.values).map_err(calc_error)?;
        edits.insert(entry.step, form.fields);
    }

    let Some(&from) = edits.keys().next() else {
        return Ok((StatusCode::CREATED, Json(Vec::new())));
    };

    let saved = cascade(&db, id, from, None, edits)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Reset a step. Saved steps after it are recomputed without it.
pub async fn delete_project_step(
    State(db): State<Database>,
    Path((id, step)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    let step = parse_step(&step)?;

    cascade(&db, id, step, Some(step), BTreeMap::new())?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Step definitions and stateless calculation
// ============================================================

/// A step definition with its form position.
#[derive(Debug, Serialize)]
pub struct StepDefinitionResponse {
    pub number: u8,
    pub title: &'static str,
    #[serde(flatten)]
    pub definition: &'static StepDefinition,
}

pub async fn list_step_definitions() -> Json<Vec<StepDefinitionResponse>> {
    Json(
        StepId::ALL
            .into_iter()
            .map(|step| StepDefinitionResponse {
                number: step.number(),
                title: step.title(),
                definition: step.definition(),
            })
            .collect(),
    )
}

/// An empty form for a step.
pub async fn get_step_form(Path(step): Path<String>) -> Result<Json<FieldSet>, ApiError> {
    let step = parse_step(&step)?;
    Ok(Json(FieldSet::initialize(step)))
}

/// Recompute a step from submitted values without touching the store.
pub async fn recompute_step(
    Path(step): Path<String>,
    Json(input): Json<RecomputeInput>,
) -> Result<Json<FieldSet>, ApiError> {
    let step = parse_step(&step)?;
    let form = FieldSet::from_values(step, &input.values).map_err(calc_error)?;
    Ok(Json(form.recompute(&input.prior)))
}

pub async fn parse_number(Json(input): Json<ParseNumberInput>) -> Json<ParseNumberResponse> {
    Json(ParseNumberResponse {
        value: input.input.value(),
    })
}

pub async fn format_number(Json(input): Json<FormatNumberInput>) -> Json<FormatNumberResponse> {
    let text = numeric::format_number(
        input.value.unwrap_or(f64::NAN),
        input.decimals,
        input.mode,
    );
    Json(FormatNumberResponse { text })
}

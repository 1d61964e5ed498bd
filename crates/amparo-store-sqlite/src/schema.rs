//! SQL schema for the Amparo SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS children (
    child_id        TEXT PRIMARY KEY,
    national_id     TEXT NOT NULL UNIQUE,
    given_name      TEXT NOT NULL,
    family_name     TEXT NOT NULL,
    birth_date      TEXT,            -- ISO 8601 date
    gender          TEXT NOT NULL,   -- 'female' | 'male' | 'other' | 'unknown'
    address         TEXT,
    health_notes    TEXT,
    school          TEXT,
    education_notes TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cases (
    case_id     TEXT PRIMARY KEY,
    case_number TEXT NOT NULL UNIQUE,  -- immutable, generated
    child_id    TEXT NOT NULL REFERENCES children(child_id),
    active      INTEGER NOT NULL DEFAULT 1,
    unit_id     TEXT NOT NULL,         -- mutated only by case transfer
    zone_id     TEXT NOT NULL,
    opened_at   TEXT NOT NULL
);

-- One active case per child.
CREATE UNIQUE INDEX IF NOT EXISTS cases_one_active_idx
    ON cases(child_id) WHERE active = 1;

CREATE TABLE IF NOT EXISTS intakes (
    intake_id             TEXT PRIMARY KEY,
    case_id               TEXT NOT NULL REFERENCES cases(case_id),
    seq_no                INTEGER NOT NULL,
    stage                 TEXT NOT NULL,   -- reception..closed
    status                TEXT NOT NULL,   -- 'open' | 'closed'
    opened_at             TEXT NOT NULL,
    closed_at             TEXT,
    closing_reason        TEXT,
    assigned_professional TEXT NOT NULL,
    last_modified_by      TEXT NOT NULL,
    emergency             INTEGER NOT NULL DEFAULT 0,
    decision              TEXT,            -- reception decision, once recorded
    decision_narrative    TEXT,
    escalation_pending    INTEGER NOT NULL DEFAULT 0,
    version               INTEGER NOT NULL DEFAULT 0,
    UNIQUE (case_id, seq_no)
);

-- One open intake per case.
CREATE UNIQUE INDEX IF NOT EXISTS intakes_one_open_idx
    ON intakes(case_id) WHERE status = 'open';

-- ── Collection sub-records: replaced wholesale on every form save. ──────

CREATE TABLE IF NOT EXISTS right_violations (
    violation_id TEXT PRIMARY KEY,
    intake_id    TEXT NOT NULL REFERENCES intakes(intake_id),
    category     TEXT NOT NULL,
    description  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS household_members (
    member_id        TEXT PRIMARY KEY,
    intake_id        TEXT NOT NULL REFERENCES intakes(intake_id),
    full_name        TEXT NOT NULL,
    national_id      TEXT,
    relationship     TEXT NOT NULL,
    birth_date       TEXT,
    cohabits         INTEGER NOT NULL DEFAULT 1,
    linked_case_id   TEXT,   -- the member's own case, if under protection
    linked_intake_id TEXT    -- the member's own open intake
);

CREATE TABLE IF NOT EXISTS community_contacts (
    contact_id   TEXT PRIMARY KEY,
    intake_id    TEXT NOT NULL REFERENCES intakes(intake_id),
    institution  TEXT NOT NULL,
    contact_name TEXT,
    phone        TEXT,
    notes        TEXT
);

CREATE TABLE IF NOT EXISTS interventions (
    intervention_id TEXT PRIMARY KEY,
    intake_id       TEXT NOT NULL REFERENCES intakes(intake_id),
    kind            TEXT NOT NULL,
    narrative       TEXT NOT NULL,
    occurred_at     TEXT NOT NULL,
    recorded_at     TEXT NOT NULL,   -- server-assigned
    recorded_by     TEXT NOT NULL,
    is_group        INTEGER NOT NULL DEFAULT 0,
    replicated_from TEXT REFERENCES interventions(intervention_id)
);

CREATE TABLE IF NOT EXISTS intervention_professionals (
    intervention_id TEXT NOT NULL REFERENCES interventions(intervention_id),
    professional_id TEXT NOT NULL,
    PRIMARY KEY (intervention_id, professional_id)
);

-- Rows with intervention_id NULL belong to the replace-on-save set;
-- rows attached to an intervention are outside it.
CREATE TABLE IF NOT EXISTS documents (
    document_id     TEXT PRIMARY KEY,
    intake_id       TEXT NOT NULL REFERENCES intakes(intake_id),
    intervention_id TEXT REFERENCES interventions(intervention_id),
    title           TEXT NOT NULL,
    blob_ref        TEXT NOT NULL,
    media_type      TEXT NOT NULL,
    uploaded_by     TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS measures (
    measure_id  TEXT PRIMARY KEY,
    intake_id   TEXT NOT NULL UNIQUE REFERENCES intakes(intake_id),
    description TEXT NOT NULL,
    adopted_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS measure_actions (
    action_id   TEXT PRIMARY KEY,
    measure_id  TEXT NOT NULL REFERENCES measures(measure_id),
    description TEXT NOT NULL,
    status      TEXT NOT NULL,   -- 'pending' | 'in_progress' | 'done'
    resource    TEXT
);

-- Transfers are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS transfers (
    transfer_id    TEXT PRIMARY KEY,
    case_id        TEXT NOT NULL REFERENCES cases(case_id),
    from_unit      TEXT NOT NULL,
    to_unit        TEXT NOT NULL,
    reason         TEXT NOT NULL,
    transferred_at TEXT NOT NULL,
    initiated_by   TEXT NOT NULL
);

-- Audit entries are strictly append-only.
CREATE TABLE IF NOT EXISTS audit_entries (
    audit_id     TEXT PRIMARY KEY,
    table_name   TEXT NOT NULL,
    record_id    TEXT NOT NULL,
    action       TEXT NOT NULL,
    actor_id     TEXT NOT NULL,
    recorded_at  TEXT NOT NULL,
    payload_json TEXT
);

CREATE TABLE IF NOT EXISTS users (
    user_id      TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    unit_id      TEXT NOT NULL,
    role         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS intakes_case_idx        ON intakes(case_id);
CREATE INDEX IF NOT EXISTS violations_intake_idx   ON right_violations(intake_id);
CREATE INDEX IF NOT EXISTS members_intake_idx      ON household_members(intake_id);
CREATE INDEX IF NOT EXISTS contacts_intake_idx     ON community_contacts(intake_id);
CREATE INDEX IF NOT EXISTS documents_intake_idx    ON documents(intake_id);
CREATE INDEX IF NOT EXISTS interventions_intake_idx ON interventions(intake_id);
CREATE INDEX IF NOT EXISTS transfers_case_idx      ON transfers(case_id);
CREATE INDEX IF NOT EXISTS audit_record_idx        ON audit_entries(record_id);
CREATE INDEX IF NOT EXISTS users_unit_idx          ON users(unit_id);

PRAGMA user_version = 1;
";

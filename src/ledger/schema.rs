//! SQL schema for the settlement ledger.
//!
//! Amounts are satoshis, heights are block heights, both stored as INTEGER.
//! `created` columns are RFC 3339 text; forwarding schedule columns are Unix
//! epoch seconds.

/// Initial schema.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE watermarks (
    address         TEXT PRIMARY KEY,
    kind            TEXT NOT NULL CHECK (kind IN ('lottery', 'sponsor')),
    scanned_height  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE sponsors (
    id                INTEGER PRIMARY KEY,
    name              TEXT NOT NULL,
    url               TEXT NOT NULL,
    bitcoin_address   TEXT NOT NULL UNIQUE REFERENCES watermarks(address),
    derivation_index  INTEGER NOT NULL UNIQUE,
    created           TEXT NOT NULL
);

CREATE TABLE payments (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    owner            TEXT NOT NULL REFERENCES watermarks(address),
    kind             TEXT NOT NULL CHECK (kind IN ('lottery', 'sponsor')),
    txid             TEXT NOT NULL,
    vout             INTEGER NOT NULL,
    block_height     INTEGER,
    amount           INTEGER NOT NULL CHECK (amount >= 0),
    dust             INTEGER NOT NULL,
    draw_id          INTEGER NOT NULL,
    sending_address  TEXT,
    created          TEXT NOT NULL,
    UNIQUE (owner, txid, vout)
);

CREATE INDEX payments_by_draw ON payments (kind, draw_id, dust);
CREATE INDEX payments_by_height ON payments (owner, block_height);

CREATE TABLE draws (
    id                            INTEGER PRIMARY KEY,
    tickets_bought                INTEGER NOT NULL DEFAULT 0,
    sponsor_contribution          INTEGER NOT NULL DEFAULT 0,
    bonus_carry                   INTEGER NOT NULL DEFAULT 0,
    block_hash                    TEXT,
    stretched_hash                TEXT,
    winning_ticket                INTEGER,
    winning_payment_txid          TEXT,
    winning_payment_vout          INTEGER,
    winner_registered_address_id  TEXT,
    winner_bonus                  INTEGER,
    winner_txid                   TEXT,
    finalized_at                  TEXT
);

CREATE TABLE registered_addresses (
    id                          TEXT PRIMARY KEY,
    bitcoin_address             TEXT NOT NULL,
    message                     TEXT NOT NULL,
    signature                   TEXT NOT NULL,
    forwarding_index            INTEGER UNIQUE,
    forwarding_last_check       INTEGER,
    forwarding_next_check_secs  INTEGER,
    created                     TEXT NOT NULL
);

CREATE INDEX registered_addresses_by_address
    ON registered_addresses (bitcoin_address, created);

CREATE TABLE sequences (
    name        TEXT PRIMARY KEY,
    next_value  INTEGER NOT NULL
);
"#;

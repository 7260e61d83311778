//! `SQLite` database for the virology store.

virology_core::define_database!(VirologyDatabase, "Virology database migrations complete");

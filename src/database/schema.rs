pub const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS artifact_metadata (
        id INTEGER PRIMARY KEY,
        title TEXT,
        culture TEXT,
        period TEXT,
        century TEXT,
        medium TEXT,
        dimensions TEXT,
        description TEXT,
        department TEXT,
        classification TEXT,
        accessionyear INTEGER,
        accessionmethod TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_artifact_metadata_classification
        ON artifact_metadata(classification);

    CREATE TABLE IF NOT EXISTS artifact_media (
        objectid INTEGER PRIMARY KEY,
        imagecount INTEGER,
        mediacount INTEGER,
        colorcount INTEGER,
        rank INTEGER,
        datebegin INTEGER,
        dateend INTEGER,
        FOREIGN KEY(objectid) REFERENCES artifact_metadata(id)
    );

    CREATE TABLE IF NOT EXISTS artifact_colors (
        objectid INTEGER NOT NULL,
        color TEXT,
        spectrum TEXT,
        hue TEXT,
        percent REAL,
        css3 TEXT,
        FOREIGN KEY(objectid) REFERENCES artifact_metadata(id)
    );

    CREATE INDEX IF NOT EXISTS idx_artifact_colors_objectid
        ON artifact_colors(objectid);
";

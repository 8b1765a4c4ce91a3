pub mod fixture {
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Manifest declaring the full generation chain plus an aggregate script
    /// and an install script. Scripts are parsed by discovery, never run.
    pub const STANDARD_MANIFEST: &str = r#"{
  "name": "events-module",
  "version": "1.0.0",
  "scripts": {
    "generate:all": "persistence-gen all --schema schema/entities.yaml --model schema/models.yaml",
    "generate:db-bean": "persistence-gen db-bean --model schema/models.yaml --out generated/db-beans",
    "generate:document-bean": "persistence-gen document-bean --schema schema/entities.yaml",
    "generate:dao": "persistence-gen dao --schema schema/entities.yaml --model schema/models.yaml",
    "install:deps": "npm ci",
    "test": "jest --coverage"
  }
}
"#;

    /// One entity whose partition key is deliberately absent from the DB
    /// model, so converters need it as a context parameter.
    pub const STANDARD_ENTITIES: &str = r#"entities:
  EventSubscription:
    keys:
      partition: tenantId
      sort: subscriptionId
    fields:
      tenantId: { type: string, required: true }
      subscriptionId: { type: string, required: true }
      channel: { type: string, required: true }
"#;

    pub const STANDARD_MODELS: &str = r#"models:
  EventSubscription:
    fields:
      subscriptionId: { type: string, required: true }
      channel: { type: string, required: true }
"#;

    /// A synthetic persistence module on disk, deleted on drop.
    pub struct ModuleFixture {
        dir: TempDir,
    }

    impl ModuleFixture {
        /// Empty module directory; add files with [`ModuleFixture::write`].
        pub fn empty() -> Self {
            ModuleFixture {
                dir: TempDir::new().expect("create temp module"),
            }
        }

        /// Complete module: manifest, schemas, and installed node
        /// dependencies.
        pub fn standard() -> Self {
            let fixture = Self::empty();
            fixture.write("package.json", STANDARD_MANIFEST);
            fixture.write("schema/entities.yaml", STANDARD_ENTITIES);
            fixture.write("schema/models.yaml", STANDARD_MODELS);
            fixture.install_node_modules();
            fixture
        }

        /// Standard module without node dependencies, for pause scenarios.
        pub fn standard_without_deps() -> Self {
            let fixture = Self::empty();
            fixture.write("package.json", STANDARD_MANIFEST);
            fixture.write("schema/entities.yaml", STANDARD_ENTITIES);
            fixture.write("schema/models.yaml", STANDARD_MODELS);
            fixture
        }

        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create fixture dirs");
            }
            fs::write(&path, contents).expect("write fixture file");
            path
        }

        pub fn install_node_modules(&self) {
            self.write("node_modules/.package-lock.json", "{}");
        }

        pub fn remove(&self, rel: &str) {
            let path = self.dir.path().join(rel);
            if path.is_dir() {
                fs::remove_dir_all(path).expect("remove fixture dir");
            } else {
                fs::remove_file(path).expect("remove fixture file");
            }
        }
    }
}

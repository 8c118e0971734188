//! Interactive command interpreter.
//!
//! Every command prints its result to the given writer. A failing command
//! prints `Error! ...` and leaves the shell running.

use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use kvlite_kv::keygen::DEFAULT_UUID_BATCH;
use kvlite_kv::{Collection, Key, Registry, connect, describe, parse_uri};
use serde_json::Value;
use tracing::debug;

use crate::config::ShellConfig;

const HELP: &[&str] = &[
    "   help\t\t\tshow this list",
    "   version\t\tshow kvlite version",
    "   history\t\tshow commands history",
    "   exit\t\t\texit from console",
    "",
    "   create <name> <uri>\tcreate new collection (if not exists)",
    "   use <collection>\tuse the collection as the default (current) collection",
    "   show collections\tlist of registered collections",
    "   remove <collection>\tremove collection",
    "   import <filename>\timport collection registry from JSON file",
    "   export <filename>\texport collection registry to JSON file",
    "",
    "   keys\t\t\tlist of keys",
    "   items\t\tlist of collection's items",
    "   get <key> ...\tshow collection entries by key",
    "   put <key> <value>\tstore JSON value under key",
    "   delete <key>\t\tdelete entry by key",
    "   count\t\tshow the amount of entries in collection",
    "   uuid\t\t\tgenerate a unique key",
    "   meta\t\t\tshow collection metadata",
    "   describe\t\tshow field types across the collection",
];

/// What the read loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

struct Current {
    name: String,
    collection: Box<dyn Collection>,
}

pub struct Shell {
    config: ShellConfig,
    registry: Registry,
    history: Vec<String>,
    current: Option<Current>,
}

impl Shell {
    /// Start a shell, loading the registry named in `config`.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let registry = Registry::load(&config.registry_path)?;
        debug!(
            "shell: {} registered collections in {}",
            registry.len(),
            config.registry_path.display()
        );
        Ok(Self {
            config,
            registry,
            history: Vec::new(),
            current: None,
        })
    }

    pub fn prompt(&self) -> String {
        match &self.current {
            Some(current) => format!("{}>", current.name),
            None => "kvlite>".to_string(),
        }
    }

    /// Run one command line.
    pub fn execute(&mut self, line: &str, out: &mut impl Write) -> Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        self.remember(line);

        let (command, args) = match line.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (line, ""),
        };
        match self.dispatch(command, args, out) {
            Ok(flow) => Ok(flow),
            Err(e) => {
                writeln!(out, "Error! {:#}", e)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Close the current collection.
    pub fn close(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.collection.close();
        }
    }

    fn remember(&mut self, line: &str) {
        if self.history.iter().any(|h| h == line) {
            return;
        }
        if self.history.len() >= self.config.history_size {
            self.history.remove(0);
        }
        self.history.push(line.to_string());
    }

    fn dispatch(&mut self, command: &str, args: &str, out: &mut impl Write) -> Result<Flow> {
        match command {
            "help" => {
                for line in HELP {
                    writeln!(out, "{}", line)?;
                }
            }
            "version" => writeln!(out, "version: {}", kvlite_kv::VERSION)?,
            "history" => {
                for (i, line) in self.history.iter().enumerate() {
                    writeln!(out, "{:02}. {}", i + 1, line)?;
                }
            }
            "exit" | "quit" => return Ok(Flow::Exit),
            "create" => self.create(args, out)?,
            "use" => self.use_collection(args, out)?,
            "show" => self.show(args, out)?,
            "remove" => self.remove(args, out)?,
            "import" => self.import(args, out)?,
            "export" => self.export(args, out)?,
            "keys" => self.keys(out)?,
            "items" => self.items(out)?,
            "get" => self.get(args, out)?,
            "put" => self.put(args, out)?,
            "delete" => self.delete(args, out)?,
            "count" => writeln!(out, "{}", self.collection()?.count()?)?,
            "uuid" => {
                let key = self.collection_mut()?.get_uuid(DEFAULT_UUID_BATCH)?;
                writeln!(out, "{}", key)?;
            }
            "meta" => match self.collection()?.meta()? {
                Some(meta) => writeln!(out, "{}", serde_json::to_string_pretty(&meta)?)?,
                None => writeln!(out, "No metadata")?,
            },
            "describe" => self.describe(out)?,
            other => bail!("unknown command: {}", other),
        }
        Ok(Flow::Continue)
    }

    fn collection(&self) -> Result<&dyn Collection> {
        match &self.current {
            Some(current) => Ok(&*current.collection),
            None => bail!("the collection is not selected, please use collection"),
        }
    }

    fn collection_mut(&mut self) -> Result<&mut dyn Collection> {
        match &mut self.current {
            Some(current) => Ok(&mut *current.collection),
            None => bail!("the collection is not selected, please use collection"),
        }
    }

    fn save_registry(&self) -> Result<()> {
        self.registry.save(&self.config.registry_path)?;
        Ok(())
    }

    fn create(&mut self, args: &str, out: &mut impl Write) -> Result<()> {
        let parts: Vec<&str> = args.split_whitespace().collect();
        let [name, uri] = parts.as_slice() else {
            bail!("usage: create <name> <uri>");
        };
        if let Some(existing) = self.registry.get(name) {
            writeln!(
                out,
                "Warning! Collection name already defined: {}, {}",
                name, existing
            )?;
            return Ok(());
        }

        let parsed = parse_uri(uri)?;
        let collection = parsed.require_collection()?;
        let manager = connect(uri)?;
        let existed = manager.collections()?.iter().any(|c| c == collection);
        manager.close();

        let mut opened = kvlite_kv::open(uri, self.config.serializer)?;
        opened.close();
        self.registry.insert(name, uri)?;
        self.save_registry()?;

        if existed {
            writeln!(out, "Connection exists, the reference added to collection list")?;
        } else {
            writeln!(out, "Collection created and added to collection list")?;
        }
        Ok(())
    }

    fn use_collection(&mut self, name: &str, out: &mut impl Write) -> Result<()> {
        let Some(uri) = self.registry.get(name) else {
            bail!("unknown collection: {}", name);
        };
        let collection = kvlite_kv::open(uri, self.config.serializer)?;
        self.close();
        self.current = Some(Current {
            name: name.to_string(),
            collection,
        });
        writeln!(out, "Using {}", name)?;
        Ok(())
    }

    fn show(&self, args: &str, out: &mut impl Write) -> Result<()> {
        if args != "collections" {
            bail!("unknown argument: {}", args);
        }
        for name in self.registry.names() {
            writeln!(out, "   {}", name)?;
        }
        Ok(())
    }

    fn remove(&mut self, name: &str, out: &mut impl Write) -> Result<()> {
        let Some(uri) = self.registry.get(name).map(str::to_string) else {
            bail!("collection name does not exist: {}", name);
        };
        if self.current.as_ref().is_some_and(|c| c.name == name) {
            self.close();
        }
        if !kvlite_kv::remove(&uri)? {
            bail!("collection does not exist, {}", uri);
        }
        self.registry.remove(name);
        self.save_registry()?;
        writeln!(out, "Collection {} deleted", name)?;
        Ok(())
    }

    fn import(&mut self, filename: &str, out: &mut impl Write) -> Result<()> {
        if filename.is_empty() {
            bail!("usage: import <filename>");
        }
        let path = Path::new(filename);
        if !path.is_file() {
            bail!("file {} does not exist", filename);
        }
        let imported = Registry::load(path)?;
        let n = self.registry.merge(imported);
        self.save_registry()?;
        writeln!(out, "Import completed, {} collections", n)?;
        Ok(())
    }

    fn export(&self, filename: &str, out: &mut impl Write) -> Result<()> {
        if filename.is_empty() {
            bail!("usage: export <filename>");
        }
        self.registry.save(Path::new(filename))?;
        writeln!(out, "Export completed to file: {}", filename)?;
        Ok(())
    }

    fn keys(&self, out: &mut impl Write) -> Result<()> {
        for document in self.collection()?.iter() {
            match document {
                Ok((key, _)) => writeln!(out, "{}", key)?,
                Err(e) => writeln!(out, "Error! {}", e)?,
            }
        }
        Ok(())
    }

    fn items(&self, out: &mut impl Write) -> Result<()> {
        for document in self.collection()?.iter() {
            match document {
                Ok((key, value)) => print_document(out, &key, &value)?,
                Err(e) => writeln!(out, "Error! {}", e)?,
            }
        }
        Ok(())
    }

    fn get(&self, args: &str, out: &mut impl Write) -> Result<()> {
        if args.is_empty() {
            bail!("usage: get <key> ...");
        }
        let collection = self.collection()?;
        // Each key is reported on its own; one bad key does not end the line.
        for key in args.split_whitespace() {
            match collection.get(Key::from(key)) {
                Ok(Some((key, value))) => print_document(out, &key, &value)?,
                Ok(None) => writeln!(out, "Error! The key {} does not exist", key)?,
                Err(e) => writeln!(out, "Error! {}", e)?,
            }
        }
        Ok(())
    }

    fn put(&mut self, args: &str, out: &mut impl Write) -> Result<()> {
        let Some((key, raw)) = args.split_once(char::is_whitespace) else {
            bail!("usage: put <key> <value>");
        };
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| anyhow::anyhow!("value decoding error: {}", e))?;
        let collection = self.collection_mut()?;
        collection.put(Key::from(key), &value)?;
        collection.commit()?;
        writeln!(out, "Done")?;
        Ok(())
    }

    fn delete(&mut self, key: &str, out: &mut impl Write) -> Result<()> {
        if key.is_empty() {
            bail!("usage: delete <key>");
        }
        let collection = self.collection_mut()?;
        if collection.get(Key::from(key))?.is_none() {
            bail!("the key {} does not exist", key);
        }
        collection.delete(Key::from(key))?;
        collection.commit()?;
        writeln!(out, "Done")?;
        Ok(())
    }

    fn describe(&self, out: &mut impl Write) -> Result<()> {
        let values = self
            .collection()?
            .iter()
            .map(|d| d.map(|(_, value)| value))
            .collect::<Result<Vec<_>, _>>()?;
        let structure = describe(&values);
        writeln!(out, "{}", serde_json::to_string_pretty(&structure)?)?;
        Ok(())
    }
}

fn print_document(out: &mut impl Write, key: &str, value: &Value) -> Result<()> {
    writeln!(out, "{}", key)?;
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use kvlite_kv::SerializerKind;
    use tempfile::TempDir;

    use super::*;
    use crate::config::DEFAULT_HISTORY_SIZE;

    fn shell(tmp: &TempDir) -> Shell {
        Shell::new(ShellConfig {
            registry_path: tmp.path().join("registry.json"),
            serializer: SerializerKind::Cbor,
            history_size: DEFAULT_HISTORY_SIZE,
        })
        .unwrap()
    }

    fn run(shell: &mut Shell, line: &str) -> String {
        let mut out = Vec::new();
        let flow = shell.execute(line, &mut out).unwrap();
        assert_eq!(flow, Flow::Continue);
        String::from_utf8(out).unwrap()
    }

    fn uri(tmp: &TempDir, collection: &str) -> String {
        format!(
            "sqlite://{}:{}",
            tmp.path().join("kv.sqlite").display(),
            collection
        )
    }

    #[test]
    fn test_create_use_put_get() {
        let tmp = TempDir::new().unwrap();
        let mut sh = shell(&tmp);

        let create = format!("create docs {}", uri(&tmp, "docs"));
        assert!(run(&mut sh, &create).contains("Collection created"));
        assert!(run(&mut sh, "use docs").contains("Using docs"));
        assert_eq!(sh.prompt(), "docs>");

        assert_eq!(run(&mut sh, r#"put 1 {"x": 1}"#), "Done\n");
        assert_eq!(run(&mut sh, "count"), "1\n");

        let got = run(&mut sh, "get 1 2");
        assert!(got.contains(&format!("{}1", "0".repeat(39))));
        assert!(got.contains("\"x\": 1"));
        assert!(got.contains("Error! The key 2 does not exist"));

        let keys = run(&mut sh, "keys");
        assert_eq!(keys.lines().count(), 1);

        assert_eq!(run(&mut sh, "delete 1"), "Done\n");
        assert_eq!(run(&mut sh, "count"), "0\n");
        assert!(run(&mut sh, "delete 1").starts_with("Error!"));
    }

    #[test]
    fn test_registry_persisted() {
        let tmp = TempDir::new().unwrap();
        {
            let mut sh = shell(&tmp);
            run(&mut sh, &format!("create docs {}", uri(&tmp, "docs")));
            assert!(run(&mut sh, &format!("create docs {}", uri(&tmp, "docs"))).contains("Warning!"));
        }
        let mut sh = shell(&tmp);
        assert_eq!(run(&mut sh, "show collections"), "   docs\n");
        assert!(run(&mut sh, &format!("create again {}", uri(&tmp, "docs"))).contains("Connection exists"));
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let mut sh = shell(&tmp);
        run(&mut sh, &format!("create docs {}", uri(&tmp, "docs")));
        run(&mut sh, "use docs");

        assert!(run(&mut sh, "remove docs").contains("Collection docs deleted"));
        assert_eq!(sh.prompt(), "kvlite>");
        assert_eq!(run(&mut sh, "show collections"), "");
        assert!(run(&mut sh, "remove docs").starts_with("Error!"));
    }

    #[test]
    fn test_import_export() {
        let tmp = TempDir::new().unwrap();
        let mut sh = shell(&tmp);
        run(&mut sh, &format!("create docs {}", uri(&tmp, "docs")));

        let exported = tmp.path().join("export.json");
        let out = run(&mut sh, &format!("export {}", exported.display()));
        assert!(out.contains("Export completed"));

        let other = TempDir::new().unwrap();
        let mut sh2 = shell(&other);
        let out = run(&mut sh2, &format!("import {}", exported.display()));
        assert!(out.contains("Import completed, 1 collections"));
        assert_eq!(run(&mut sh2, "show collections"), "   docs\n");
        assert!(run(&mut sh2, "import /no/such/file.json").starts_with("Error!"));
    }

    #[test]
    fn test_errors_do_not_stop_the_shell() {
        let tmp = TempDir::new().unwrap();
        let mut sh = shell(&tmp);
        assert!(run(&mut sh, "count").starts_with("Error!"));
        assert!(run(&mut sh, "frobnicate").starts_with("Error! unknown command"));
        assert!(run(&mut sh, "create bad nope://x").starts_with("Error!"));
        assert!(run(&mut sh, "use missing").starts_with("Error!"));

        run(&mut sh, &format!("create docs {}", uri(&tmp, "docs")));
        run(&mut sh, "use docs");
        assert!(run(&mut sh, "put 1 {not json").starts_with("Error! value decoding error"));
        assert!(run(&mut sh, &format!("delete {}", "0".repeat(40))).starts_with("Error!"));
    }

    #[test]
    fn test_get_reports_each_key() {
        let tmp = TempDir::new().unwrap();
        let mut sh = shell(&tmp);
        run(&mut sh, &format!("create docs {}", uri(&tmp, "docs")));
        run(&mut sh, "use docs");
        run(&mut sh, r#"put 1 {"x": 1}"#);
        run(&mut sh, r#"put 2 {"x": 2}"#);

        let got = run(&mut sh, &format!("get 1 {} 2 3", "a".repeat(41)));
        assert!(got.contains("\"x\": 1"));
        assert!(got.contains("\"x\": 2"));
        assert!(got.contains("Error! key error: the length of key is more than 40 characters"));
        assert!(got.contains("Error! The key 3 does not exist"));
        assert_eq!(got.lines().filter(|l| l.starts_with("Error!")).count(), 2);
    }

    #[test]
    fn test_history_and_exit() {
        let tmp = TempDir::new().unwrap();
        let mut sh = Shell::new(ShellConfig {
            registry_path: tmp.path().join("registry.json"),
            serializer: SerializerKind::Cbor,
            history_size: 2,
        })
        .unwrap();
        run(&mut sh, "version");
        run(&mut sh, "version");
        run(&mut sh, "help");
        let history = run(&mut sh, "history");
        assert_eq!(history, "01. help\n02. history\n");

        let mut out = Vec::new();
        assert_eq!(sh.execute("exit", &mut out).unwrap(), Flow::Exit);
    }

    #[test]
    fn test_meta_uuid_describe() {
        let tmp = TempDir::new().unwrap();
        let mut sh = shell(&tmp);
        run(&mut sh, &format!("create docs {}", uri(&tmp, "docs")));
        run(&mut sh, "use docs");
        run(&mut sh, r#"put a {"n": 1, "tags": ["x"]}"#);

        let meta = run(&mut sh, "meta");
        assert!(meta.contains("\"name\": \"docs\""));
        assert!(meta.contains("\"serializer\": \"cbor\""));

        let uuid = run(&mut sh, "uuid");
        assert_eq!(uuid.trim().len(), 40);

        let described = run(&mut sh, "describe");
        assert!(described.contains("\"total_documents\": 1"));
        assert!(described.contains("integer_type"));

        let items = run(&mut sh, "items");
        assert!(items.contains("\"tags\""));
    }
}

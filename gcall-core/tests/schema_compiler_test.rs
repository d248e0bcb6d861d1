use gcall_core::resolver::{self, RpcShape};
use gcall_core::schema::{SchemaCompiler, SchemaError, SchemaStore, TempRegistry};
use std::path::Path;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn compiles_folder_tree_with_imports_and_well_known_types() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("imported/dep.proto"),
        concat!(
            "syntax = \"proto3\";\n",
            "package demo;\n",
            "message Payload { string name = 1; }\n",
        ),
    );
    write(
        &dir.path().join("root.proto"),
        concat!(
            "syntax = \"proto3\";\n",
            "package demo;\n",
            "import \"imported/dep.proto\";\n",
            "import \"google/protobuf/timestamp.proto\";\n",
            "message Event { Payload payload = 1; google.protobuf.Timestamp at = 2; }\n",
            "service EventService { rpc Send(Event) returns (Event); }\n",
        ),
    );

    let registry = TempRegistry::new();
    let compiler =
        SchemaCompiler::for_folder(&dir.path().display().to_string(), None, None).unwrap();
    let pool = compiler.compile(&registry).unwrap();

    assert!(pool.get_message_by_name("demo.Event").is_some());
    assert!(pool.get_message_by_name("demo.Payload").is_some());

    let resolved = resolver::resolve(&pool, "demo.EventService/Send").unwrap();
    assert_eq!(resolved.shape(), RpcShape::Unary);

    registry.cleanup();
    assert!(registry.paths().is_empty());
}

#[test]
fn inline_two_file_schema_with_plain_bundle() {
    let inline = concat!(
        "syntax = \"proto3\";\n",
        "package test;\n",
        "import \"foo/bar/imported.proto\";\n",
        "message A { foo.bar.B b = 1; }\n",
        "service Alpha { rpc Get(A) returns (A); }\n",
    );
    let lib = concat!(
        "=== file: foo/bar/imported.proto\n",
        "syntax = \"proto3\";\n",
        "package foo.bar;\n",
        "message B { int32 x = 1; }\n",
    );

    let store = SchemaStore::new();
    let compiler = SchemaCompiler::for_inline(inline, Some(lib), store.registry()).unwrap();
    let pool = store.load(&compiler).unwrap();

    // Both the inline file and the imported library file are in the set.
    assert!(pool.files().count() >= 2);
    assert!(pool.get_message_by_name("foo.bar.B").is_some());

    let resolved = resolver::resolve(&pool, "test.Alpha/Get").unwrap();
    assert_eq!(resolved.shape(), RpcShape::Unary);

    store.cleanup();
}

#[test]
fn inline_json_bundle_compiles() {
    let inline = concat!(
        "syntax = \"proto3\";\n",
        "package test;\n",
        "import \"dep.proto\";\n",
        "message A { B b = 1; }\n",
    );
    let lib = r#"{"dep.proto": "syntax = \"proto3\";\npackage test;\nmessage B { int32 x = 1; }\n"}"#;

    let registry = TempRegistry::new();
    let compiler = SchemaCompiler::for_inline(inline, Some(lib), &registry).unwrap();
    let pool = compiler.compile(&registry).unwrap();
    assert!(pool.get_message_by_name("test.B").is_some());
    registry.cleanup();
}

#[test]
fn inline_zip_bundle_compiles() {
    use base64::Engine;
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("dep.proto", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(b"syntax = \"proto3\";\npackage test;\nmessage B { int32 x = 1; }\n")
        .unwrap();
    let archive = writer.finish().unwrap().into_inner();
    let lib = base64::engine::general_purpose::STANDARD.encode(archive);

    let inline = concat!(
        "syntax = \"proto3\";\n",
        "package test;\n",
        "import \"dep.proto\";\n",
        "message A { B b = 1; }\n",
    );

    let registry = TempRegistry::new();
    let compiler = SchemaCompiler::for_inline(inline, Some(&lib), &registry).unwrap();
    let pool = compiler.compile(&registry).unwrap();
    assert!(pool.get_message_by_name("test.A").is_some());
    registry.cleanup();
}

#[test]
fn binary_descriptor_short_circuits_compilation() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor_path = dir.path().join("bookstore.bin");
    std::fs::write(&descriptor_path, bookstore_service::FILE_DESCRIPTOR_SET).unwrap();

    let registry = TempRegistry::new();
    let compiler =
        SchemaCompiler::for_folder(&descriptor_path.display().to_string(), None, None).unwrap();
    let pool = compiler.compile(&registry).unwrap();

    let resolved = resolver::resolve(&pool, "bookstore.Bookstore/CreateShelf").unwrap();
    assert_eq!(resolved.shape(), RpcShape::Unary);
    // Nothing was staged for a pre-compiled descriptor set.
    assert!(registry.paths().is_empty());
}

#[test]
fn schema_store_memoizes_per_source() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("a.proto"),
        "syntax = \"proto3\";\npackage memo;\nmessage A { int32 x = 1; }\n",
    );

    let store = SchemaStore::new();
    let compiler =
        SchemaCompiler::for_folder(&dir.path().display().to_string(), None, None).unwrap();
    let first = store.load(&compiler).unwrap();
    let staged_after_first = store.registry().paths().len();

    let second = store.load(&compiler).unwrap();
    assert!(first.get_message_by_name("memo.A").is_some());
    assert!(second.get_message_by_name("memo.A").is_some());
    // The second load came from the cache; no further staging happened.
    assert_eq!(store.registry().paths().len(), staged_after_first);

    store.cleanup();
}

#[test]
fn compilation_failure_carries_compiler_output() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("broken.proto"),
        "syntax = \"proto3\";\npackage broken;\nmessage A { this is not valid }\n",
    );

    let registry = TempRegistry::new();
    let compiler =
        SchemaCompiler::for_folder(&dir.path().display().to_string(), None, None).unwrap();
    let err = compiler.compile(&registry).unwrap_err();

    match err {
        SchemaError::Compilation { status, stderr, .. } => {
            assert_ne!(status, 0);
            assert!(stderr.contains("broken.proto"), "{stderr}");
        }
        other => panic!("expected compilation error, got {other:?}"),
    }
    registry.cleanup();
}

#[test]
fn large_trees_compile_the_same_as_small_ones() {
    // Above the batch threshold the compiler is driven through an @argfile;
    // the resulting descriptor set must be just as complete.
    let large = tempfile::tempdir().unwrap();
    for i in 0..120 {
        write(
            &large.path().join(format!("m{i}.proto")),
            &format!("syntax = \"proto3\";\npackage big;\nmessage M{i} {{ int32 x = 1; }}\n"),
        );
    }

    let small = tempfile::tempdir().unwrap();
    for i in 0..3 {
        write(
            &small.path().join(format!("m{i}.proto")),
            &format!("syntax = \"proto3\";\npackage small;\nmessage M{i} {{ int32 x = 1; }}\n"),
        );
    }

    let registry = TempRegistry::new();

    let large_pool = SchemaCompiler::for_folder(&large.path().display().to_string(), None, None)
        .unwrap()
        .compile(&registry)
        .unwrap();
    for i in 0..120 {
        assert!(
            large_pool.get_message_by_name(&format!("big.M{i}")).is_some(),
            "missing big.M{i}"
        );
    }

    let small_pool = SchemaCompiler::for_folder(&small.path().display().to_string(), None, None)
        .unwrap()
        .compile(&registry)
        .unwrap();
    for i in 0..3 {
        assert!(small_pool.get_message_by_name(&format!("small.M{i}")).is_some());
    }

    registry.cleanup();
}

#[test]
fn lib_folder_include_paths_resolve_imports_outside_the_root() {
    let lib = tempfile::tempdir().unwrap();
    write(
        &lib.path().join("shared/types.proto"),
        "syntax = \"proto3\";\npackage shared;\nmessage T { string id = 1; }\n",
    );

    let root = tempfile::tempdir().unwrap();
    write(
        &root.path().join("main.proto"),
        concat!(
            "syntax = \"proto3\";\n",
            "package app;\n",
            "import \"shared/types.proto\";\n",
            "message Wrapper { shared.T t = 1; }\n",
        ),
    );

    let registry = TempRegistry::new();
    let compiler = SchemaCompiler::for_folder(
        &root.path().display().to_string(),
        Some(&lib.path().display().to_string()),
        None,
    )
    .unwrap();
    let pool = compiler.compile(&registry).unwrap();
    assert!(pool.get_message_by_name("shared.T").is_some());
    assert!(pool.get_message_by_name("app.Wrapper").is_some());
    registry.cleanup();
}

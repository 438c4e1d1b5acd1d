use git2::{Repository, Signature};
use ripplescan::changeset::analyze_branch_changes;
use ripplescan::config::Config;
use ripplescan::locator::find_build_unit;
use ripplescan::navigator::{GitTreeNavigator, NodeKind, TreeNavigator};
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(&p, content).unwrap();
}

fn stage(repo: &Repository, rels: &[&str]) -> git2::Oid {
    let mut index = repo.index().unwrap();
    for rel in rels {
        index.add_path(Path::new(rel)).unwrap();
    }
    index.write().unwrap();
    index.write_tree().unwrap()
}

/// Two branches: `main` holds Lib with one source file; `feature` edits that
/// file, adds a new App project, and deletes nothing.
fn fixture() -> (TempDir, Repository) {
    let tmp = TempDir::new().unwrap();
    let repo = Repository::init(tmp.path()).unwrap();
    let sig = Signature::now("tester", "tester@example.com").unwrap();

    write(tmp.path(), "Src/Lib/Lib.csproj", "<Project/>");
    write(
        tmp.path(),
        "Src/Lib/Deep/Thing.cs",
        "namespace Lib { class Thing { } }",
    );
    write(tmp.path(), "README.md", "fixture");

    let tree_id = stage(&repo, &["Src/Lib/Lib.csproj", "Src/Lib/Deep/Thing.cs", "README.md"]);
    let base_commit = {
        let tree = repo.find_tree(tree_id).unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "base", &tree, &[])
            .unwrap();
        repo.find_commit(oid).unwrap()
    };
    repo.branch("main", &base_commit, true).unwrap();

    write(
        tmp.path(),
        "Src/Lib/Deep/Thing.cs",
        "namespace Lib { class Thing { int Changed; } }",
    );
    write(tmp.path(), "Src/App/App.csproj", "<Project/>");
    write(tmp.path(), "Src/App/Program.cs", "class Program { }");

    let tree_id = stage(
        &repo,
        &["Src/Lib/Deep/Thing.cs", "Src/App/App.csproj", "Src/App/Program.cs"],
    );
    let feature_commit = {
        let tree = repo.find_tree(tree_id).unwrap();
        let oid = repo
            .commit(None, &sig, &sig, "feature work", &tree, &[&base_commit])
            .unwrap();
        repo.find_commit(oid).unwrap()
    };
    repo.branch("feature", &feature_commit, true).unwrap();

    // Release the borrows these commit handles hold on `repo` so it can be
    // moved out of the fixture.
    drop(feature_commit);
    drop(base_commit);
    (tmp, repo)
}

#[test]
fn snapshot_navigator_lists_with_stored_names() {
    let (_tmp, repo) = fixture();
    let commit = repo
        .find_branch("main", git2::BranchType::Local)
        .unwrap()
        .get()
        .peel_to_commit()
        .unwrap();
    let nav = GitTreeNavigator::for_commit(&repo, &commit).unwrap();

    let mut children = nav.list(Path::new("Src/Lib")).unwrap();
    children.sort();
    assert_eq!(
        children,
        vec![
            ("Deep".to_string(), NodeKind::Container),
            ("Lib.csproj".to_string(), NodeKind::Leaf),
        ]
    );
}

#[test]
fn snapshot_paths_match_case_insensitively() {
    let (_tmp, repo) = fixture();
    let commit = repo
        .find_branch("main", git2::BranchType::Local)
        .unwrap()
        .get()
        .peel_to_commit()
        .unwrap();
    let nav = GitTreeNavigator::for_commit(&repo, &commit).unwrap();

    let content = nav.read_leaf(Path::new("src/lib/deep/THING.CS")).unwrap();
    assert!(content.contains("class Thing"));

    let manifest = find_build_unit(&nav, Path::new("src/lib/deep/Thing.cs"), ".csproj")
        .expect("locator should find the manifest through differently-cased components");
    assert_eq!(
        manifest,
        Path::new("src/lib").join("Lib.csproj"),
        "caller's directory spelling is kept; the leaf keeps its stored name"
    );
}

#[test]
fn file_component_aborts_the_lookup_silently() {
    let (_tmp, repo) = fixture();
    let commit = repo
        .find_branch("main", git2::BranchType::Local)
        .unwrap()
        .get()
        .peel_to_commit()
        .unwrap();
    let nav = GitTreeNavigator::for_commit(&repo, &commit).unwrap();

    // README.md is a file; using it as a directory cannot descend, and the
    // locator reports the absence of a result rather than failing.
    assert!(nav.list(Path::new("README.md/sub")).is_err());
    let found = find_build_unit(&nav, Path::new("README.md/sub/File.cs"), ".csproj");
    assert!(found.is_none());
}

#[test]
fn branch_changes_group_by_owning_manifest() {
    let (tmp, _repo) = fixture();
    let cfg = Config::default();

    let changes = analyze_branch_changes(tmp.path(), "feature", "main", &cfg).unwrap();

    let mut projects: Vec<&String> = changes.keys().collect();
    projects.sort();
    assert_eq!(projects, vec!["Src/App/App.csproj", "Src/Lib/Lib.csproj"]);
    assert_eq!(
        changes["Src/Lib/Lib.csproj"],
        vec!["Src/Lib/Deep/Thing.cs".to_string()]
    );
    assert_eq!(
        changes["Src/App/App.csproj"],
        vec!["Src/App/Program.cs".to_string()],
        "the manifest itself is not a source file; only Program.cs is recorded"
    );
}

#[test]
fn missing_branch_is_a_configuration_error() {
    let (tmp, _repo) = fixture();
    let cfg = Config::default();

    let err = analyze_branch_changes(tmp.path(), "no-such-branch", "main", &cfg)
        .expect_err("missing feature branch must fail");
    assert!(err.to_string().contains("no-such-branch"), "err: {err:#}");
}

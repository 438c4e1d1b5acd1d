use ripplescan::config::Config;
use ripplescan::funnel::{find_consumers, ConsumerQuery, Stage};
use ripplescan::manifest::derive_namespace;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(&p, content).unwrap();
    p
}

/// Scope layout: A declares `Widget`; B references A, imports A's namespace
/// and calls `new Widget().Render()`; C references A but never imports the
/// namespace.
fn scope_with_three_projects(root: &Path) -> PathBuf {
    let target = write(
        root,
        "A/A.csproj",
        r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
    <RootNamespace>Contoso.Widgets</RootNamespace>
  </PropertyGroup>
</Project>"#,
    );
    write(
        root,
        "A/Widget.cs",
        r#"namespace Contoso.Widgets
{
    public class Widget
    {
        public void Render() { }
    }
}"#,
    );

    write(
        root,
        "B/B.csproj",
        r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <ProjectReference Include="..\A\A.csproj" />
  </ItemGroup>
</Project>"#,
    );
    write(
        root,
        "B/Renderer.cs",
        r#"using Contoso.Widgets;

namespace Contoso.App
{
    public class Renderer
    {
        public void Draw()
        {
            new Widget().Render();
        }
    }
}"#,
    );
    write(
        root,
        "B/Helpers.cs",
        "namespace Contoso.App { static class Helpers { } }",
    );

    write(
        root,
        "C/C.csproj",
        r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <ProjectReference Include="../A/A.csproj" />
  </ItemGroup>
</Project>"#,
    );
    write(
        root,
        "C/Standalone.cs",
        "namespace Contoso.Other { class Standalone { } }",
    );

    target
}

#[test]
fn end_to_end_type_and_method_filter_yields_exactly_b() {
    let tmp = TempDir::new().unwrap();
    let target = scope_with_three_projects(tmp.path());
    let cfg = Config::default();

    let namespace = derive_namespace(&target).expect("namespace derives from RootNamespace");
    assert_eq!(namespace, "Contoso.Widgets");

    let query = ConsumerQuery {
        target_manifest: &target,
        search_scope: tmp.path(),
        namespace: Some(&namespace),
        type_name: Some("Widget"),
        method_name: Some("Render"),
    };
    let consumers = find_consumers(&query, &cfg).unwrap();

    assert_eq!(consumers.len(), 1, "only B survives the full funnel");
    assert_eq!(consumers[0].unit.name(), "B");
    assert_eq!(consumers[0].stage, Stage::CallSiteUsage);
    assert_eq!(
        consumers[0].files,
        vec![tmp.path().join("B/Renderer.cs")],
        "B's attributed set is exactly the file containing the Render( call"
    );
}

#[test]
fn consumer_failing_stage_one_never_reappears() {
    let tmp = TempDir::new().unwrap();
    let target = scope_with_three_projects(tmp.path());
    // D imports the namespace and uses the type, but declares no project
    // reference: it must not appear at any precision level.
    write(tmp.path(), "D/D.csproj", "<Project Sdk=\"Microsoft.NET.Sdk\"></Project>");
    write(
        tmp.path(),
        "D/Freeloader.cs",
        "using Contoso.Widgets;\nclass Freeloader { void F() { new Widget().Render(); } }",
    );

    let cfg = Config::default();
    for (type_name, method_name) in
        [(None, None), (Some("Widget"), None), (Some("Widget"), Some("Render"))]
    {
        let query = ConsumerQuery {
            target_manifest: &target,
            search_scope: tmp.path(),
            namespace: Some("Contoso.Widgets"),
            type_name,
            method_name,
        };
        let consumers = find_consumers(&query, &cfg).unwrap();
        assert!(
            consumers.iter().all(|c| c.unit.name() != "D"),
            "no resurrection past a stage-1 failure (filters: {type_name:?}/{method_name:?})"
        );
    }
}

#[test]
fn namespace_only_query_narrows_to_importing_consumer() {
    let tmp = TempDir::new().unwrap();
    let target = scope_with_three_projects(tmp.path());
    let cfg = Config::default();

    let query = ConsumerQuery {
        target_manifest: &target,
        search_scope: tmp.path(),
        namespace: Some("Contoso.Widgets"),
        type_name: None,
        method_name: None,
    };
    let consumers = find_consumers(&query, &cfg).unwrap();

    assert_eq!(consumers.len(), 1, "C drops at the namespace stage");
    assert_eq!(consumers[0].unit.name(), "B");
    assert_eq!(consumers[0].stage, Stage::NamespaceImport);
    assert_eq!(
        consumers[0].files,
        vec![tmp.path().join("B/Renderer.cs")],
        "only the importing file is attributed"
    );
}

#[test]
fn sub_namespace_imports_count() {
    let tmp = TempDir::new().unwrap();
    let target = scope_with_three_projects(tmp.path());
    write(
        tmp.path(),
        "B/DeepImport.cs",
        "using Contoso.Widgets.Rendering.Gl;\nclass Deep { }",
    );

    let cfg = Config::default();
    let query = ConsumerQuery {
        target_manifest: &target,
        search_scope: tmp.path(),
        namespace: Some("Contoso.Widgets"),
        type_name: None,
        method_name: None,
    };
    let consumers = find_consumers(&query, &cfg).unwrap();
    let b = consumers.iter().find(|c| c.unit.name() == "B").unwrap();
    assert!(
        b.files.contains(&tmp.path().join("B/DeepImport.cs")),
        "an import of a sub-namespace satisfies the namespace stage"
    );
}

//! Snapshot store contract: what is saved is what is loaded.

use std::path::Path;

use tutor_core::config::TutorConfig;
use tutor_core::engine::AnalysisEngine;
use tutor_core::models::FileManifest;
use tutor_core::PersistenceManager;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn test_saved_analysis_loads_identically() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "shop/models.py",
        "from dataclasses import dataclass\n\n@dataclass\nclass Item:\n    \"\"\"A sellable item.\"\"\"\n    name: str\n    price: float\n",
    );
    write(
        project.path(),
        "shop/api.py",
        "from shop.models import Item\n\n@app.get('/items')\nasync def list_items():\n    \"\"\"List items.\"\"\"\n    try:\n        return [Item('a', 1.0)]\n    except ValueError:\n        return []\n",
    );
    let config = TutorConfig::for_root(project.path());
    let analysis = AnalysisEngine::from_config(project.path(), &config)
        .analyze_codebase("shop", false, false)
        .unwrap();

    let store_dir = tempfile::tempdir().unwrap();
    let store = PersistenceManager::at(store_dir.path());
    store.save_analysis(&analysis).unwrap();
    assert_eq!(store.load_analysis("shop").unwrap(), Some(analysis.clone()));
    for file in analysis.files.values() {
        assert_eq!(
            store.load_file_analysis("shop", &file.path).unwrap().as_ref(),
            Some(file)
        );
    }
    assert_eq!(store.list_codebases().unwrap(), vec!["shop"]);
}

#[test]
fn test_engine_writes_manifest_matching_files() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "a.py", "x = 1\n");
    write(project.path(), "lib/b.ts", "export const b = 1;\n");
    let config = TutorConfig::for_root(project.path());
    let analysis = AnalysisEngine::from_config(project.path(), &config)
        .analyze_codebase("repo", true, true)
        .unwrap();

    let store = PersistenceManager::new(&config.persistence);
    let manifest = store.load_file_hashes("repo").unwrap();
    let expected: FileManifest = analysis
        .files
        .values()
        .map(|f| (f.path.clone(), f.content_hash.clone()))
        .collect();
    assert_eq!(manifest, expected);
    assert!(project
        .path()
        .join(".tutor/analyses/repo/analysis.json")
        .exists());
}

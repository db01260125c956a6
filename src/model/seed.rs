use super::{Node, NodeKind, Note, Snapshot};

/// Built-in dataset used on first run and whenever stored state is unusable.
pub fn snapshot() -> Snapshot {
    Snapshot::new(forest(), notes())
}

fn node(id: &str, name: &str, kind: NodeKind, children: Vec<Node>, note_ids: &[&str]) -> Node {
    Node {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        children,
        note_ids: note_ids.iter().map(|id| id.to_string()).collect(),
        description: None,
    }
}

fn forest() -> Vec<Node> {
    vec![
        node(
            "medicina",
            "Medicine",
            NodeKind::Area,
            vec![
                node(
                    "anatomia-stack",
                    "Anatomy",
                    NodeKind::Stack,
                    vec![
                        node(
                            "anatomia-basica",
                            "Basic Anatomy",
                            NodeKind::Notebook,
                            Vec::new(),
                            &["heart-failure", "skeletal-system"],
                        ),
                        node(
                            "neuroanatomia",
                            "Neuroanatomy",
                            NodeKind::Notebook,
                            Vec::new(),
                            &["cranial-nerves"],
                        ),
                    ],
                    &[],
                ),
                node(
                    "farmacologia-stack",
                    "Pharmacology",
                    NodeKind::Stack,
                    vec![node(
                        "farmaco-cardio",
                        "Cardiovascular Drugs",
                        NodeKind::Notebook,
                        Vec::new(),
                        &["beta-blockers"],
                    )],
                    &[],
                ),
            ],
            &[],
        ),
        node(
            "personal",
            "Personal",
            NodeKind::Area,
            vec![node(
                "projects-stack",
                "Projects",
                NodeKind::Stack,
                vec![node("ideas", "Ideas", NodeKind::Notebook, Vec::new(), &[])],
                &[],
            )],
            &[],
        ),
    ]
}

fn note(id: &str, title: &str, description: &str, content: &str) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        description: Some(description.to_string()),
        date: "2024-01-15".to_string(),
        image_url: None,
        content: content.to_string(),
    }
}

fn notes() -> Vec<Note> {
    vec![
        note(
            "heart-failure",
            "Heart Failure",
            "Pathophysiology and classification",
            "<h1>Heart Failure</h1><p>The heart cannot pump enough blood to meet the body's needs.</p>\
             <ul><li><strong>Systolic</strong>: reduced ejection fraction</li>\
             <li><strong>Diastolic</strong>: preserved ejection fraction</li></ul>",
        ),
        note(
            "skeletal-system",
            "Skeletal System",
            "Bones of the adult skeleton",
            "<h1>Skeletal System</h1><p>The adult skeleton has <em>206</em> bones.</p>",
        ),
        note(
            "cranial-nerves",
            "Cranial Nerves",
            "The twelve pairs",
            "<h2>Cranial Nerves</h2><ol><li>Olfactory</li><li>Optic</li><li>Oculomotor</li></ol>",
        ),
        note(
            "beta-blockers",
            "Beta Blockers",
            "Mechanism and indications",
            "<h2>Beta Blockers</h2><p>Block the effects of epinephrine on beta receptors.</p>",
        ),
    ]
}

use std::collections::HashSet;

use super::{Node, NodeKind, Note};

/// Pre-order search for the first node matching `pred`.
pub fn find<'a, P>(forest: &'a [Node], pred: P) -> Option<&'a Node>
where
    P: Fn(&Node) -> bool,
{
    fn walk<'a>(nodes: &'a [Node], pred: &dyn Fn(&Node) -> bool) -> Option<&'a Node> {
        for node in nodes {
            if pred(node) {
                return Some(node);
            }
            if let Some(found) = walk(&node.children, pred) {
                return Some(found);
            }
        }
        None
    }
    walk(forest, &pred)
}

pub fn find_by_id<'a>(forest: &'a [Node], id: &str) -> Option<&'a Node> {
    find(forest, |node| node.id == id)
}

/// Every node matching `pred`, in pre-order.
pub fn collect<'a, P>(forest: &'a [Node], pred: P) -> Vec<&'a Node>
where
    P: Fn(&Node) -> bool,
{
    fn walk<'a>(nodes: &'a [Node], pred: &dyn Fn(&Node) -> bool, out: &mut Vec<&'a Node>) {
        for node in nodes {
            if pred(node) {
                out.push(node);
            }
            walk(&node.children, pred, out);
        }
    }
    let mut out = Vec::new();
    walk(forest, &pred, &mut out);
    out
}

/// Nodes from a root down to (and including) the node with `id`.
pub fn path_to<'a>(forest: &'a [Node], id: &str) -> Option<Vec<&'a Node>> {
    fn walk<'a>(nodes: &'a [Node], id: &str, trail: &mut Vec<&'a Node>) -> bool {
        for node in nodes {
            trail.push(node);
            if node.id == id || walk(&node.children, id, trail) {
                return true;
            }
            trail.pop();
        }
        false
    }
    let mut trail = Vec::new();
    walk(forest, id, &mut trail).then_some(trail)
}

/// Copy-on-write replacement of the node with `id`.
///
/// Only the ancestors on the path to the target are rebuilt. Returns `None`
/// when no node carries `id`.
pub fn replace_at_id<F>(forest: &[Node], id: &str, f: F) -> Option<Vec<Node>>
where
    F: FnOnce(&Node) -> Node,
{
    fn walk<F: FnOnce(&Node) -> Node>(
        nodes: &[Node],
        id: &str,
        f: &mut Option<F>,
    ) -> Option<Vec<Node>> {
        for (index, node) in nodes.iter().enumerate() {
            let replacement = if node.id == id {
                let f = f.take()?;
                f(node)
            } else if let Some(children) = walk(&node.children, id, f) {
                with_children(node, children)
            } else {
                continue;
            };
            let mut next = nodes.to_vec();
            next[index] = replacement;
            return Some(next);
        }
        None
    }
    let mut f = Some(f);
    walk(forest, id, &mut f)
}

fn with_children(node: &Node, children: Vec<Node>) -> Node {
    Node {
        id: node.id.clone(),
        name: node.name.clone(),
        kind: node.kind,
        children,
        note_ids: node.note_ids.clone(),
        description: node.description.clone(),
    }
}

/// Replaces the node with `id` only when it has the expected kind.
fn replace_kind<F>(forest: &[Node], id: &str, kind: NodeKind, f: F) -> Vec<Node>
where
    F: FnOnce(&Node) -> Node,
{
    match find_by_id(forest, id) {
        Some(node) if node.kind == kind => {
            replace_at_id(forest, id, f).unwrap_or_else(|| forest.to_vec())
        }
        _ => forest.to_vec(),
    }
}

/// Breadcrumb names from a root to the node. `None` when the id is unknown.
pub fn find_path_names(forest: &[Node], id: &str) -> Option<Vec<String>> {
    path_to(forest, id).map(|path| path.into_iter().map(|node| node.name.clone()).collect())
}

pub fn find_notebook_containing<'a>(forest: &'a [Node], note_id: &str) -> Option<&'a Node> {
    find(forest, |node| {
        node.is_notebook() && node.note_ids.iter().any(|id| id == note_id)
    })
}

/// Notes referenced by a notebook, in `noteIds` order. Dangling ids are skipped.
pub fn notes_in_notebook<'a>(forest: &[Node], notes: &'a [Note], notebook_id: &str) -> Vec<&'a Note> {
    let Some(notebook) = find_by_id(forest, notebook_id) else {
        return Vec::new();
    };
    notebook
        .note_ids
        .iter()
        .filter_map(|id| notes.iter().find(|note| &note.id == id))
        .collect()
}

pub fn add_area(forest: &[Node], name: &str) -> Vec<Node> {
    let mut next = forest.to_vec();
    next.push(Node::new(NodeKind::Area, name));
    next
}

pub fn add_stack(forest: &[Node], area_id: &str, name: &str) -> Vec<Node> {
    append_child(forest, area_id, NodeKind::Area, name)
}

pub fn add_notebook(forest: &[Node], stack_id: &str, name: &str) -> Vec<Node> {
    append_child(forest, stack_id, NodeKind::Stack, name)
}

fn append_child(forest: &[Node], parent_id: &str, parent_kind: NodeKind, name: &str) -> Vec<Node> {
    let Some(child_kind) = parent_kind.child_kind() else {
        return forest.to_vec();
    };
    replace_kind(forest, parent_id, parent_kind, |parent| {
        let mut children = parent.children.clone();
        children.push(Node::new(child_kind, name));
        with_children(parent, children)
    })
}

/// Prepends `note` to the collection and its id to the notebook's `noteIds`.
///
/// Leaves both collections untouched when the notebook does not exist.
pub fn add_note(
    notes: &[Note],
    forest: &[Node],
    notebook_id: &str,
    note: Note,
) -> (Vec<Note>, Vec<Node>) {
    match find_by_id(forest, notebook_id) {
        Some(node) if node.is_notebook() => {}
        _ => return (notes.to_vec(), forest.to_vec()),
    }
    let note_id = note.id.clone();
    let forest = replace_kind(forest, notebook_id, NodeKind::Notebook, |notebook| {
        let mut updated = notebook.clone();
        updated.note_ids.insert(0, note_id);
        updated
    });
    let mut next_notes = Vec::with_capacity(notes.len() + 1);
    next_notes.push(note);
    next_notes.extend_from_slice(notes);
    (next_notes, forest)
}

pub fn remove_area(forest: &[Node], notes: &[Note], area_id: &str) -> (Vec<Node>, Vec<Note>) {
    let Some(index) = forest
        .iter()
        .position(|node| node.id == area_id && node.kind == NodeKind::Area)
    else {
        return (forest.to_vec(), notes.to_vec());
    };
    let mut next = forest.to_vec();
    let removed = next.remove(index);
    let notes = drop_orphaned_notes(&removed, &next, notes);
    (next, notes)
}

pub fn remove_stack(
    forest: &[Node],
    notes: &[Note],
    area_id: &str,
    stack_id: &str,
) -> (Vec<Node>, Vec<Note>) {
    remove_child(forest, notes, area_id, NodeKind::Area, stack_id)
}

pub fn remove_notebook(
    forest: &[Node],
    notes: &[Note],
    stack_id: &str,
    notebook_id: &str,
) -> (Vec<Node>, Vec<Note>) {
    remove_child(forest, notes, stack_id, NodeKind::Stack, notebook_id)
}

fn remove_child(
    forest: &[Node],
    notes: &[Note],
    parent_id: &str,
    parent_kind: NodeKind,
    child_id: &str,
) -> (Vec<Node>, Vec<Note>) {
    let removed = match find_by_id(forest, parent_id) {
        Some(parent) if parent.kind == parent_kind => {
            parent.children.iter().find(|child| child.id == child_id)
        }
        _ => None,
    };
    let Some(removed) = removed else {
        return (forest.to_vec(), notes.to_vec());
    };
    let next = replace_kind(forest, parent_id, parent_kind, |parent| {
        let children = parent
            .children
            .iter()
            .filter(|child| child.id != child_id)
            .cloned()
            .collect();
        with_children(parent, children)
    });
    let notes = drop_orphaned_notes(removed, &next, notes);
    (next, notes)
}

/// Drops notes referenced from `removed` unless the remaining forest still
/// references them.
fn drop_orphaned_notes(removed: &Node, remaining: &[Node], notes: &[Note]) -> Vec<Note> {
    let mut doomed: HashSet<&str> = HashSet::new();
    for notebook in collect(std::slice::from_ref(removed), |node| !node.note_ids.is_empty()) {
        doomed.extend(notebook.note_ids.iter().map(String::as_str));
    }
    for notebook in collect(remaining, |node| !node.note_ids.is_empty()) {
        for id in &notebook.note_ids {
            doomed.remove(id.as_str());
        }
    }
    notes
        .iter()
        .filter(|note| !doomed.contains(note.id.as_str()))
        .cloned()
        .collect()
}

/// Deletes the note and unlinks it from the notebook.
///
/// A missing notebook makes the call a no-op for both collections.
pub fn remove_note(
    forest: &[Node],
    notes: &[Note],
    notebook_id: &str,
    note_id: &str,
) -> (Vec<Node>, Vec<Note>) {
    match find_by_id(forest, notebook_id) {
        Some(node) if node.is_notebook() => {}
        _ => return (forest.to_vec(), notes.to_vec()),
    }
    let next = replace_kind(forest, notebook_id, NodeKind::Notebook, |notebook| {
        let mut updated = notebook.clone();
        updated.note_ids.retain(|id| id != note_id);
        updated
    });
    let notes = notes
        .iter()
        .filter(|note| note.id != note_id)
        .cloned()
        .collect();
    (next, notes)
}

pub fn rename_node(forest: &[Node], id: &str, name: &str) -> Vec<Node> {
    replace_at_id(forest, id, |node| {
        let mut renamed = node.clone();
        renamed.name = name.to_string();
        renamed
    })
    .unwrap_or_else(|| forest.to_vec())
}

pub fn update_note_content(notes: &[Note], note_id: &str, content: &str) -> Vec<Note> {
    update_note(notes, note_id, |note| note.content = content.to_string())
}

pub fn update_note_title(notes: &[Note], note_id: &str, title: &str) -> Vec<Note> {
    update_note(notes, note_id, |note| note.title = title.to_string())
}

fn update_note<F>(notes: &[Note], note_id: &str, f: F) -> Vec<Note>
where
    F: FnOnce(&mut Note),
{
    let mut next = notes.to_vec();
    if let Some(note) = next.iter_mut().find(|note| note.id == note_id) {
        f(note);
    }
    next
}

//! People/organisation relationship graph assembled from page payloads.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;

use crate::payload::{OrganisationRecord, PersonRecord, RelationshipRecord};

const MEMBERSHIP_KIND: &str = "organisation-membership";
const MEMBERSHIP_COLOUR: &str = "#669933";

/// Kind of a node or edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Person,
    Organisation,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: Kind,
    pub colour: &'static str,
    pub shape: &'static str,
}

/// A directed graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: Kind,
    pub colour: &'static str,
}

/// Label options for rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelOptions {
    /// Show ids instead of names for people.
    pub anonymise_people: bool,
    /// Show ids instead of names for organisations.
    pub anonymise_organisations: bool,
}

/// Nodes keyed by id plus the edges whose endpoints both exist.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkGraph {
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
    #[serde(skip)]
    skipped_edges: usize,
    #[serde(skip)]
    duplicate_nodes: usize,
}

fn person_id(pk: u64) -> String {
    format!("person-{pk}")
}

fn organisation_id(pk: u64) -> String {
    format!("organisation-{pk}")
}

impl NetworkGraph {
    /// Builds the graph: people, then organisations, then person-to-person
    /// and person-to-organisation relationships. Relationships pointing at a
    /// record that is not in the node set (filtered out upstream) are
    /// skipped.
    #[must_use]
    pub fn build(
        people: &[PersonRecord],
        organisations: &[OrganisationRecord],
        relationships: &[RelationshipRecord],
        organisation_relationships: &[RelationshipRecord],
    ) -> Self {
        let mut graph = Self::default();
        for person in people {
            graph.add_node(Node {
                id: person_id(person.pk),
                name: person.name.clone(),
                kind: Kind::Person,
                colour: "#0099cc",
                shape: "ellipse",
            });
        }
        for organisation in organisations {
            graph.add_node(Node {
                id: organisation_id(organisation.pk),
                name: organisation.name.clone(),
                kind: Kind::Organisation,
                colour: "#669933",
                shape: "rectangle",
            });
        }
        for rel in relationships {
            graph.add_edge(Edge {
                id: format!("relationship-{}", rel.pk),
                source: person_id(rel.source.pk),
                target: person_id(rel.target.pk),
                kind: Kind::Person,
                colour: edge_colour(rel.kind.as_deref(), "grey"),
            });
        }
        for rel in organisation_relationships {
            graph.add_edge(Edge {
                id: format!("organisation-relationship-{}", rel.pk),
                source: person_id(rel.source.pk),
                target: organisation_id(rel.target.pk),
                kind: Kind::Organisation,
                colour: edge_colour(rel.kind.as_deref(), "black"),
            });
        }
        graph
    }

    /// Inserts the node unless its id is taken; the first record wins.
    fn add_node(&mut self, node: Node) {
        match self.nodes.entry(node.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
            Entry::Occupied(existing) => {
                log::warn!(
                    "duplicate node {}: keeping {:?}, dropping {:?}",
                    node.id,
                    existing.get().name,
                    node.name
                );
                self.duplicate_nodes += 1;
            }
        }
    }

    /// Inserts the edge if both endpoints are present, returning whether it
    /// was added.
    fn add_edge(&mut self, edge: Edge) -> bool {
        if self.nodes.contains_key(&edge.source) && self.nodes.contains_key(&edge.target) {
            self.edges.push(edge);
            true
        } else {
            log::debug!("skipping edge {} with missing endpoint", edge.id);
            self.skipped_edges += 1;
            false
        }
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of relationships dropped for missing endpoints.
    #[must_use]
    pub const fn skipped_edges(&self) -> usize {
        self.skipped_edges
    }

    /// Records dropped because their id was already present.
    #[must_use]
    pub const fn duplicate_nodes(&self) -> usize {
        self.duplicate_nodes
    }

    /// Number of edges touching `id`.
    #[must_use]
    pub fn degree(&self, id: &str) -> usize {
        self.edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .count()
    }

    /// Display size of a node, growing with its connections.
    #[must_use]
    pub fn node_size(&self, id: &str) -> usize {
        100 + 20 * self.degree(id)
    }

    /// Label for a node under the given options.
    #[must_use]
    pub fn label<'a>(&self, node: &'a Node, options: LabelOptions) -> &'a str {
        let anonymise = match node.kind {
            Kind::Person => options.anonymise_people,
            Kind::Organisation => options.anonymise_organisations,
        };
        if anonymise {
            node.id.as_str()
        } else {
            node.name.as_str()
        }
    }

    /// Copy of the graph without organisation nodes and organisation edges.
    #[must_use]
    pub fn without_organisations(&self) -> Self {
        Self {
            nodes: self
                .nodes
                .iter()
                .filter(|(_, n)| n.kind != Kind::Organisation)
                .map(|(k, n)| (k.clone(), n.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| e.kind != Kind::Organisation)
                .cloned()
                .collect(),
            skipped_edges: self.skipped_edges,
            duplicate_nodes: self.duplicate_nodes,
        }
    }
}

fn edge_colour(kind: Option<&str>, default: &'static str) -> &'static str {
    if kind == Some(MEMBERSHIP_KIND) {
        MEMBERSHIP_COLOUR
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Endpoint;

    fn person(pk: u64, name: &str) -> PersonRecord {
        PersonRecord {
            pk,
            name: name.into(),
        }
    }

    fn rel(pk: u64, source: u64, target: u64, kind: Option<&str>) -> RelationshipRecord {
        RelationshipRecord {
            pk,
            source: Endpoint { pk: source },
            target: Endpoint { pk: target },
            kind: kind.map(str::to_string),
        }
    }

    fn sample() -> NetworkGraph {
        NetworkGraph::build(
            &[person(1, "Ada"), person(2, "Bo")],
            &[OrganisationRecord {
                pk: 1,
                name: "Uni".into(),
            }],
            &[rel(10, 1, 2, None), rel(11, 1, 3, None)],
            &[rel(20, 2, 1, Some("organisation-membership")), rel(21, 2, 8, None)],
        )
    }

    #[test]
    fn edges_with_missing_endpoints_are_skipped() {
        let graph = sample();
        assert_eq!(graph.nodes().count(), 3);
        let ids: Vec<_> = graph.edges().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["relationship-10", "organisation-relationship-20"]);
        assert_eq!(graph.skipped_edges(), 2);
    }

    #[test]
    fn repeated_pk_keeps_first_record() {
        let graph = NetworkGraph::build(
            &[person(1, "Ada"), person(1, "Impostor"), person(2, "Bo")],
            &[],
            &[rel(10, 1, 2, None)],
            &[],
        );
        assert_eq!(graph.nodes().count(), 2);
        assert_eq!(graph.node("person-1").unwrap().name, "Ada");
        assert_eq!(graph.duplicate_nodes(), 1);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(sample().duplicate_nodes(), 0);
    }

    #[test]
    fn person_and_organisation_ids_do_not_collide() {
        let graph = sample();
        assert_eq!(graph.node("person-1").unwrap().name, "Ada");
        assert_eq!(graph.node("organisation-1").unwrap().name, "Uni");
    }

    #[test]
    fn edge_colours_follow_kind() {
        let graph = sample();
        assert_eq!(graph.edges()[0].colour, "grey");
        assert_eq!(graph.edges()[1].colour, "#669933");
    }

    #[test]
    fn node_size_grows_with_degree() {
        let graph = sample();
        assert_eq!(graph.degree("person-2"), 2);
        assert_eq!(graph.node_size("person-2"), 140);
        assert_eq!(graph.node_size("person-9"), 100);
    }

    #[test]
    fn hiding_organisations_drops_their_edges() {
        let graph = sample().without_organisations();
        assert!(graph.node("organisation-1").is_none());
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0].kind, Kind::Person);
    }

    #[test]
    fn anonymised_labels_use_ids() {
        let graph = sample();
        let ada = graph.node("person-1").unwrap();
        let uni = graph.node("organisation-1").unwrap();
        let options = LabelOptions {
            anonymise_people: true,
            anonymise_organisations: false,
        };
        assert_eq!(graph.label(ada, options), "person-1");
        assert_eq!(graph.label(uni, options), "Uni");
    }
}

use crate::program::Inst;

/// How a value crosses a graph edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassBy {
    Move,
    Copy,
    Borrow,
}

/// An output terminal: a producing node and a port. Node 0 stands for the
/// graph's own inputs; real nodes start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Oterm {
    pub node: u32,
    pub port: u32,
}

#[derive(Clone, Debug)]
pub struct GraphNode {
    pub inst: Inst,
    pub inputs: Vec<(Oterm, PassBy)>,
    pub output_count: u32,
}

/// A finalized dataflow graph: input borrow flags, nodes in topological
/// order, and the exit terminals with their pass-by discipline.
#[derive(Clone, Debug)]
pub struct FunctionGraph {
    pub input_borrows: Vec<bool>,
    pub nodes: Vec<GraphNode>,
    pub outputs: Vec<(Oterm, PassBy)>,
}

impl FunctionGraph {
    pub fn input_count(&self) -> usize {
        self.input_borrows.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

/// Builder for a [`FunctionGraph`]. Nodes may only reference terminals that
/// already exist, so the node order is topological by construction.
pub struct ConstructingGraph {
    input_borrows: Vec<bool>,
    nodes: Vec<GraphNode>,
}

impl ConstructingGraph {
    /// Start a graph with one input terminal per flag; `true` marks an input
    /// that arrives as a borrowed future.
    pub fn make(input_borrows: Vec<bool>) -> (ConstructingGraph, Vec<Oterm>) {
        let terms = (0..input_borrows.len() as u32)
            .map(|port| Oterm { node: 0, port })
            .collect();
        (
            ConstructingGraph {
                input_borrows,
                nodes: Vec::new(),
            },
            terms,
        )
    }

    pub fn add(
        &mut self,
        inst: Inst,
        inputs: &[Oterm],
        pass_bys: &[PassBy],
        output_count: u32,
    ) -> Vec<Oterm> {
        assert_eq!(inputs.len(), pass_bys.len());
        for term in inputs {
            assert!((term.node as usize) <= self.nodes.len(), "forward edge");
        }

        let node = GraphNode {
            inst,
            inputs: inputs.iter().copied().zip(pass_bys.iter().copied()).collect(),
            output_count,
        };
        self.nodes.push(node);

        let producer = self.nodes.len() as u32;
        (0..output_count)
            .map(|port| Oterm {
                node: producer,
                port,
            })
            .collect()
    }

    pub fn finalize(self, outputs: &[Oterm], pass_bys: &[PassBy]) -> FunctionGraph {
        assert_eq!(outputs.len(), pass_bys.len());
        assert!(
            !pass_bys.contains(&PassBy::Borrow),
            "graph outputs cannot be borrowed"
        );
        FunctionGraph {
            input_borrows: self.input_borrows,
            nodes: self.nodes,
            outputs: outputs
                .iter()
                .copied()
                .zip(pass_bys.iter().copied())
                .collect(),
        }
    }
}

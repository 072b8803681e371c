/// Binary node persistence.
///
/// # Layout
///
/// All integers and floats are big-endian. `UTF` is a `u16` byte length
/// followed by UTF-8 bytes; `bool` is one byte.
///
/// | Field | Encoding |
/// |-------|----------|
/// | name | UTF |
/// | observed | bool |
/// | observed state | i32 (-1 when unobserved) |
/// | parent count | i32 |
/// | parents | i32 topological index each |
/// | state count | i32 |
/// | state names | UTF each |
/// | belief | f64 per state |
/// | CPT | f64 per entry, row-major |
///
/// The CPT carries no shape header: it is rebuilt from the node's own state
/// count and its parents', so parents must already be loaded at the indices
/// recorded. A network stream is an `i32` node count followed by the nodes in
/// topological order.

use std::io::{Read, Write};

use crate::core::error::BayesError;
use crate::core::network::Network;
use crate::core::node::NodeId;

/// Write one node.
pub fn write_node<W: Write>(writer: &mut W, network: &Network, id: NodeId) -> Result<(), BayesError> {
    let node = network.node(id)?;
    write_utf(writer, node.name())?;
    write_bool(writer, node.is_observed())?;
    let observed = match node.observed_state() {
        Some(state) => to_i32(state)?,
        None => -1,
    };
    write_i32(writer, observed)?;

    write_i32(writer, to_i32(node.parents().len())?)?;
    for parent in node.parents() {
        write_i32(writer, to_i32(network.node(*parent)?.topo_index())?)?;
    }

    write_i32(writer, to_i32(node.num_states())?)?;
    for state in node.states() {
        write_utf(writer, state)?;
    }
    for value in node.belief().values() {
        write_f64(writer, *value)?;
    }
    for value in node.cpt().values() {
        write_f64(writer, *value)?;
    }
    Ok(())
}

/// Read one node and add it to `network`, wiring it to parents that are
/// already present.
///
/// The whole record is read and checked before `network` is touched, so a
/// truncated or inconsistent record leaves the network unchanged.
pub fn read_node<R: Read>(reader: &mut R, network: &mut Network) -> Result<NodeId, BayesError> {
    // 1. Header and parents
    let name = read_utf(reader)?;
    let observed = read_bool(reader)?;
    let observed_state = read_i32(reader)?;

    let parent_count = read_count(reader)?;
    let mut parents = Vec::with_capacity(parent_count);
    let mut entries = 1usize;
    for _ in 0..parent_count {
        let topo = read_count(reader)?;
        let parent = network
            .topological_order()
            .get(topo)
            .copied()
            .ok_or_else(|| BayesError::Format(format!("{name}: no node at topological index {topo}")))?;
        if parents.contains(&parent) {
            return Err(BayesError::Format(format!("{name}: parent index {topo} repeated")));
        }
        entries = entries
            .checked_mul(network.node(parent)?.num_states())
            .ok_or_else(|| BayesError::Format(format!("{name}: CPT too large")))?;
        parents.push(parent);
    }

    // 2. States, belief and CPT
    let state_count = read_count(reader)?;
    let mut states = Vec::with_capacity(state_count);
    for _ in 0..state_count {
        states.push(read_utf(reader)?);
    }
    let mut belief = Vec::with_capacity(state_count);
    for _ in 0..state_count {
        belief.push(read_f64(reader)?);
    }
    let entries = entries
        .checked_mul(state_count)
        .ok_or_else(|| BayesError::Format(format!("{name}: CPT too large")))?;
    let mut cpt = Vec::with_capacity(entries);
    for _ in 0..entries {
        cpt.push(read_f64(reader)?);
    }

    let observed = if observed {
        match usize::try_from(observed_state) {
            Ok(state) if state < state_count => Some(state),
            _ => {
                return Err(BayesError::Format(format!(
                    "{name}: observed state {observed_state} out of range"
                )))
            }
        }
    } else {
        None
    };

    // 3. Mutate; add_node validates the name and states before inserting
    let id = network.add_node(&name, states)?;
    for parent in &parents {
        let parent_name = network.node(*parent)?.name().to_string();
        network.add_parent(&name, &parent_name)?;
    }
    network.replace_cpt(id, cpt)?;

    let node = network.node_mut(id)?;
    node.belief_mut().set_values(belief)?;
    if let Some(state) = observed {
        node.observe_index(state)?;
    }
    tracing::trace!(node = %name, parents = parents.len(), "read node");
    Ok(id)
}

/// Write every node in topological order, preceded by the node count.
pub fn write_network<W: Write>(writer: &mut W, network: &Network) -> Result<(), BayesError> {
    write_i32(writer, to_i32(network.len())?)?;
    for id in network.topological_order() {
        write_node(writer, network, *id)?;
    }
    Ok(())
}

/// Read a stream produced by [`write_network`] into a fresh network.
pub fn read_network<R: Read>(reader: &mut R) -> Result<Network, BayesError> {
    let count = read_count(reader)?;
    let mut network = Network::new();
    for _ in 0..count {
        read_node(reader, &mut network)?;
    }
    tracing::debug!(nodes = count, "read network");
    Ok(network)
}

// --- primitives -------------------------------------------------------------

fn to_i32(value: usize) -> Result<i32, BayesError> {
    i32::try_from(value).map_err(|_| BayesError::Format(format!("{value} does not fit in an i32")))
}

fn write_utf<W: Write>(writer: &mut W, text: &str) -> Result<(), BayesError> {
    let len = u16::try_from(text.len())
        .map_err(|_| BayesError::Format(format!("string of {} bytes is too long", text.len())))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<(), BayesError> {
    writer.write_all(&[u8::from(value)])?;
    Ok(())
}

fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<(), BayesError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

fn write_f64<W: Write>(writer: &mut W, value: f64) -> Result<(), BayesError> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

fn read_utf<R: Read>(reader: &mut R) -> Result<String, BayesError> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    let mut bytes = vec![0u8; usize::from(u16::from_be_bytes(len))];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| BayesError::Format(e.to_string()))
}

fn read_bool<R: Read>(reader: &mut R) -> Result<bool, BayesError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0] != 0)
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32, BayesError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_be_bytes(bytes))
}

/// A non-negative `i32` used as a count or index.
fn read_count<R: Read>(reader: &mut R) -> Result<usize, BayesError> {
    let value = read_i32(reader)?;
    usize::try_from(value).map_err(|_| BayesError::Format(format!("negative count {value}")))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64, BayesError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(f64::from_be_bytes(bytes))
}

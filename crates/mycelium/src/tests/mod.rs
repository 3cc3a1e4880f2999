//! Behaviour suites for the mesh.

mod support;

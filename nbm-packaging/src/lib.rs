// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Module versioning, dependency consistency and update tracking primitives.

This crate defines pure Rust implementations of the primitives a modular
application platform uses to version its modules, reason about the
dependencies between them and record which files each installed module owns.

# Goals

## Determinism

Given the same inputs, operations produce the same outputs. Consistency reports
and build orders are computed over ordered collections so reruns emit identical
results. Rewrites of project descriptors are idempotent: rewriting the output of a
rewrite is a no-op.

## Preserving Hand Written Files

Project descriptors are maintained by humans. Edits to them only touch the
elements that change and keep the formatting of everything else.

# A Tour of Functionality

Specification versions are dotted sequences of integers. They are defined by
[spec_version::SpecificationVersion], which also implements the rules for
incrementing versions on trunk and branches.

A module is identified by its code name base and optional release version. See
[module_identity::ModuleIdentity].

Module metadata lives in JAR manifests. [manifest::ModuleManifest] parses them.
Dependency expressions found in manifests are parsed into
[dependency::DependencyDeclaration].

[dependency_graph::DependencyGraph] holds a set of modules. It reports modules
whose dependencies are unsatisfied via [dependency_graph::DependencyGraph::problems]
and sorts modules into a build order via
[dependency_graph::topological_sort].

Module projects declare dependencies in `project.xml` files, modeled by
[project_xml::ProjectDescriptor]. [rewriter::DependencyRewriter] refreshes and
injects dependencies in these files.

Installed modules are recorded in update tracking ledgers. See
[update_tracking::ModuleTracking] for a single module and
[update_tracking::TrackingDirectory] for all modules of a cluster.
*/

pub mod dependency;
pub mod dependency_graph;
pub mod error;
pub mod io;
pub mod manifest;
pub mod module_identity;
pub mod project_xml;
pub mod rewriter;
pub mod spec_version;
pub mod update_tracking;
pub mod xml_tree;

/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

use crate::util::AddressFamily;

#[derive(Error, Debug)]
pub enum CreateError {
    #[error("neither address family is enabled")]
    NoFamilyEnabled,
    #[error("zero egress ports requested per family")]
    NoPortsRequested,
    #[error("could not open all {family} egress ports, bound {bound} of {requested}")]
    PortShortfall {
        family: AddressFamily,
        bound: usize,
        requested: usize,
    },
}

impl CreateError {
    pub fn get_type(&self) -> &str {
        match self {
            CreateError::NoFamilyEnabled => "NoFamilyEnabled",
            CreateError::NoPortsRequested => "NoPortsRequested",
            CreateError::PortShortfall { .. } => "PortShortfall",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DispatchError {
    #[error("dispatcher is not running")]
    NotRunning,
    #[error("query was dropped before completion")]
    Dropped,
}

impl DispatchError {
    pub fn get_type(&self) -> &str {
        match self {
            DispatchError::NotRunning => "NotRunning",
            DispatchError::Dropped => "Dropped",
        }
    }
}

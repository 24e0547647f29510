use control_model::{Actuators, VehicleState, NI, NS};

/// One block of the decision vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Var {
    X,
    Y,
    Psi,
    V,
    Cte,
    Epsi,
    Delta,
    A,
}

/// State blocks in decision vector order. The constraint vector uses the same order.
pub const STATES: [Var; NS] = [Var::X, Var::Y, Var::Psi, Var::V, Var::Cte, Var::Epsi];
pub const ACTUATORS: [Var; NI] = [Var::Delta, Var::A];

/// Offsets into the decision vector for a horizon of `N` timesteps.
///
/// States occupy `N` slots per variable, actuators `N - 1` because the last state has no
/// control applied after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    N: usize,
}

impl Layout {
    pub fn new(N: usize) -> Layout {
        Layout { N }
    }

    pub fn horizon(&self) -> usize {
        self.N
    }

    pub fn n_vars(&self) -> usize {
        self.N * NS + (self.N - 1) * NI
    }

    pub fn n_constraints(&self) -> usize {
        self.N * NS
    }

    /// Number of slots in the block of `var`.
    pub fn len(&self, var: Var) -> usize {
        match var {
            Var::Delta | Var::A => self.N - 1,
            _ => self.N,
        }
    }

    pub fn start(&self, var: Var) -> usize {
        let N = self.N;
        match var {
            Var::X => 0,
            Var::Y => N,
            Var::Psi => 2 * N,
            Var::V => 3 * N,
            Var::Cte => 4 * N,
            Var::Epsi => 5 * N,
            Var::Delta => 6 * N,
            Var::A => 6 * N + (N - 1),
        }
    }

    pub fn index(&self, var: Var, t: usize) -> usize {
        debug_assert!(t < self.len(var));
        self.start(var) + t
    }

    pub fn state<T: Copy>(&self, vars: &[T], t: usize) -> VehicleState<T> {
        let mut s = [vars[0]; NS];
        for (value, &var) in s.iter_mut().zip(&STATES) {
            *value = vars[self.index(var, t)];
        }
        VehicleState::from_array(s)
    }

    pub fn actuators<T: Copy>(&self, vars: &[T], t: usize) -> Actuators<T> {
        Actuators {
            delta: vars[self.index(Var::Delta, t)],
            a: vars[self.index(Var::A, t)],
        }
    }

    pub fn set_state<T: Copy>(&self, vars: &mut [T], t: usize, state: &VehicleState<T>) {
        for (&value, &var) in state.to_array().iter().zip(&STATES) {
            vars[self.index(var, t)] = value;
        }
    }
}
